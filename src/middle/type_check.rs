use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::{
    diagnostics::Diagnostics,
    frontend::ast::{Block, Expr, ExprKind, NodeId, Stmt, StmtKind},
    middle::{
        resolve::{Resolution, Resolutions},
        ty::Ty,
    },
};

/// Checked types for every function, `let` binding, and expression,
/// memoized by node id. Built once per compilation unit; queries after
/// that are pure.
#[derive(Debug)]
pub struct Checker {
    stmt_tys: BTreeMap<NodeId, Ty>,
    expr_tys: BTreeMap<NodeId, Ty>,
}

impl Checker {
    pub fn check(
        ast: &[Stmt],
        resolutions: &Resolutions,
        diagnostics: &mut Diagnostics,
    ) -> Checker {
        let mut ctx = CheckCtx {
            fn_stmts: HashMap::new(),
            let_stmts: HashMap::new(),
            resolutions,
            diagnostics,
            stmt_tys: BTreeMap::new(),
            expr_tys: BTreeMap::new(),
        };

        ctx.index_stmts(ast);
        for stmt in ast {
            ctx.check_stmt(stmt);
        }

        Checker {
            stmt_tys: ctx.stmt_tys,
            expr_tys: ctx.expr_tys,
        }
    }

    /// The type of a `fn` statement
    pub fn fn_stmt_ty(&self, id: NodeId) -> Ty {
        self.stmt_tys
            .get(&id)
            .expect("fn statement was checked")
            .clone()
    }

    /// The type of a `let` statement's binding
    pub fn let_stmt_ty(&self, id: NodeId) -> Ty {
        self.stmt_tys
            .get(&id)
            .expect("let statement was checked")
            .clone()
    }

    pub fn expr_ty(&self, id: NodeId) -> Ty {
        self.expr_tys
            .get(&id)
            .expect("expression was checked")
            .clone()
    }
}

struct CheckCtx<'ast, 'diag> {
    /// Every `fn` statement in the unit, for on-demand signature queries
    /// (forward references resolve before their definition is visited)
    fn_stmts: HashMap<NodeId, &'ast Stmt>,
    let_stmts: HashMap<NodeId, &'ast Stmt>,
    resolutions: &'ast Resolutions,
    diagnostics: &'diag mut Diagnostics,
    stmt_tys: BTreeMap<NodeId, Ty>,
    expr_tys: BTreeMap<NodeId, Ty>,
}

impl<'ast, 'diag> CheckCtx<'ast, 'diag> {
    fn index_stmts(&mut self, stmts: &'ast [Stmt]) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Fn(fn_stmt) => {
                    self.fn_stmts.insert(stmt.id, stmt);
                    self.index_block(&fn_stmt.body);
                }
                StmtKind::Let { .. } => {
                    self.let_stmts.insert(stmt.id, stmt);
                }
                StmtKind::Loop { body } => self.index_block(body),
                StmtKind::If { truthy, falsy, .. } => {
                    self.index_block(truthy);
                    if let Some(falsy) = falsy {
                        self.index_block(falsy);
                    }
                }
                _ => {}
            }
        }
    }

    fn index_block(&mut self, block: &'ast Block) {
        self.index_stmts(&block.stmts);
    }

    fn check_stmt(&mut self, stmt: &'ast Stmt) {
        match &stmt.kind {
            StmtKind::Error | StmtKind::Break => {}
            StmtKind::Fn(fn_stmt) => {
                self.fn_stmt_ty(stmt.id);
                self.check_block(&fn_stmt.body);
            }
            StmtKind::Let { .. } => {
                self.let_stmt_ty(stmt);
            }
            StmtKind::Loop { body } => self.check_block(body),
            StmtKind::If {
                condition,
                truthy,
                falsy,
            } => {
                self.expr_ty(condition);
                self.check_block(truthy);
                if let Some(falsy) = falsy {
                    self.check_block(falsy);
                }
            }
            StmtKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.expr_ty(expr);
                }
            }
            StmtKind::Assign { subject, expr } => {
                self.expr_ty(subject);
                self.expr_ty(expr);
            }
            StmtKind::Expr { expr } => {
                self.expr_ty(expr);
            }
        }
    }

    fn check_block(&mut self, block: &'ast Block) {
        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }
    }

    fn fn_stmt_ty(&mut self, id: NodeId) -> Ty {
        if let Some(ty) = self.stmt_tys.get(&id) {
            return ty.clone();
        }

        let stmt = self.fn_stmts.get(&id).expect("fn statement was indexed");
        let StmtKind::Fn(fn_stmt) = &stmt.kind else {
            unreachable!("only fn statements are indexed");
        };

        let params = fn_stmt
            .params
            .iter()
            .map(|param| (*param, Ty::int()))
            .collect();
        let ty = Ty::function(id, fn_stmt.ident, params, Ty::int());

        self.stmt_tys.insert(id, ty.clone());
        ty
    }

    fn let_stmt_ty(&mut self, stmt: &'ast Stmt) -> Ty {
        if let Some(ty) = self.stmt_tys.get(&stmt.id) {
            return ty.clone();
        }

        let StmtKind::Let { expr, .. } = &stmt.kind else {
            unreachable!("caller checked the statement kind");
        };

        // placeholder breaks the cycle for self-referential initializers
        self.stmt_tys.insert(stmt.id, Ty::error());

        let ty = self.expr_ty(expr);
        self.stmt_tys.insert(stmt.id, ty.clone());
        ty
    }

    fn expr_ty(&mut self, expr: &'ast Expr) -> Ty {
        if let Some(ty) = self.expr_tys.get(&expr.id) {
            return ty.clone();
        }

        let ty = self.compute_expr_ty(expr);
        self.expr_tys.insert(expr.id, ty.clone());
        ty
    }

    fn compute_expr_ty(&mut self, expr: &'ast Expr) -> Ty {
        match &expr.kind {
            ExprKind::Error => Ty::error(),
            ExprKind::Ident(_) => {
                let Some(resolution) = self.resolutions.expr(expr.id) else {
                    // the resolver already reported this identifier
                    return Ty::error();
                };

                match resolution {
                    Resolution::Fn(node) => self.fn_stmt_ty(node),
                    Resolution::Param { .. } => Ty::int(),
                    Resolution::Let(node) => {
                        let stmt =
                            *self.let_stmts.get(&node).expect("let statement was indexed");
                        self.let_stmt_ty(stmt)
                    }
                    Resolution::Loop(_) => {
                        unreachable!("identifiers never resolve to loops")
                    }
                }
            }
            ExprKind::Int(_) => Ty::int(),
            ExprKind::Call { callee, args } => {
                let callee_ty = self.expr_ty(callee);

                let Some(fn_ty) = callee_ty.as_fn() else {
                    self.diagnostics.report(expr.line, "call to non-function");
                    return Ty::error();
                };

                if fn_ty.params.len() != args.len() {
                    let message = format!(
                        "argument mismatch, expected {}, got {}",
                        fn_ty.params.len(),
                        args.len()
                    );
                    self.diagnostics.report(expr.line, message);
                    return Ty::error();
                }

                let return_ty = fn_ty.return_ty.clone();
                let param_tys: Vec<Ty> =
                    fn_ty.params.iter().map(|(_, ty)| ty.clone()).collect();

                for (arg, param_ty) in args.iter().zip(param_tys) {
                    let arg_ty = self.expr_ty(arg);

                    if !arg_ty.assignable_to(&param_ty) {
                        let message = format!(
                            "argument mismatch, type '{arg_ty}' not assignable to '{param_ty}'"
                        );
                        self.diagnostics.report(expr.line, message);
                    }
                }

                return_ty
            }
            ExprKind::Binary { op, left, right } => {
                let left_ty = self.expr_ty(left);
                let right_ty = self.expr_ty(right);

                if left_ty.is_int() && right_ty.is_int() {
                    return Ty::int();
                }

                let message = format!(
                    "cannot '{}' type '{left_ty}' with '{right_ty}'",
                    op.symbol()
                );
                self.diagnostics.report(expr.line, message);
                Ty::error()
            }
        }
    }
}
