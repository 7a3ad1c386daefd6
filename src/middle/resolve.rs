use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::{
    diagnostics::Diagnostics,
    frontend::{
        ast::{Block, Expr, ExprKind, NodeId, Stmt, StmtKind},
        intern::Symbol,
    },
};

/// What an identifier expression or a `break` statement refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A `fn` statement
    Fn(NodeId),
    /// A parameter of the enclosing function, by declaration index
    Param { fn_node: NodeId, index: usize },
    /// A `let` statement
    Let(NodeId),
    /// The innermost enclosing `loop` (only ever attached to `break`)
    Loop(NodeId),
}

/// The resolver's output: bindings keyed by the id of the statement or
/// expression that referenced them.
#[derive(Debug, Default)]
pub struct Resolutions {
    stmts: BTreeMap<NodeId, Resolution>,
    exprs: BTreeMap<NodeId, Resolution>,
}

impl Resolutions {
    pub fn stmt(&self, id: NodeId) -> Option<Resolution> {
        self.stmts.get(&id).copied()
    }

    pub fn expr(&self, id: NodeId) -> Option<Resolution> {
        self.exprs.get(&id).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Root,
    /// Pushed for a function body. Lookups that cross one of these never
    /// see outer `let` bindings (functions do not capture locals).
    Function,
    Normal,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    bindings: HashMap<Symbol, Resolution>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            bindings: HashMap::new(),
        }
    }
}

/// Walks the AST binding identifiers and `break` targets. Function items in
/// a statement list are deferred and resolved after their siblings, so
/// forward references between functions work.
#[derive(Debug)]
pub struct Resolver<'diag> {
    scopes: Vec<Scope>,
    loop_stack: Vec<NodeId>,
    resolutions: Resolutions,
    diagnostics: &'diag mut Diagnostics,
}

impl<'diag> Resolver<'diag> {
    pub fn resolve(ast: &[Stmt], diagnostics: &'diag mut Diagnostics) -> Resolutions {
        let mut resolver = Self {
            scopes: vec![Scope::new(ScopeKind::Root)],
            loop_stack: Vec::new(),
            resolutions: Resolutions::default(),
            diagnostics,
        };

        resolver.resolve_stmts(ast);
        resolver.resolutions
    }

    fn define(&mut self, ident: Symbol, resolution: Resolution) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .bindings
            .insert(ident, resolution);
    }

    fn lookup(&self, ident: Symbol) -> Option<Resolution> {
        let mut crossed_function = false;

        for scope in self.scopes.iter().rev() {
            if let Some(resolution) = scope.bindings.get(&ident) {
                if crossed_function && matches!(resolution, Resolution::Let(_)) {
                    return None;
                }

                return Some(*resolution);
            }

            if scope.kind == ScopeKind::Function {
                crossed_function = true;
            }
        }

        None
    }

    fn resolve_stmts(&mut self, stmts: &[Stmt]) {
        let mut sibling_fns = Vec::new();

        for stmt in stmts {
            self.resolve_stmt(stmt, &mut sibling_fns);
        }

        for stmt in sibling_fns {
            let StmtKind::Fn(fn_stmt) = &stmt.kind else {
                unreachable!("only fn statements are deferred");
            };

            let outer_loops = std::mem::take(&mut self.loop_stack);
            self.scopes.push(Scope::new(ScopeKind::Function));

            for (index, param) in fn_stmt.params.iter().enumerate() {
                self.define(
                    *param,
                    Resolution::Param {
                        fn_node: stmt.id,
                        index,
                    },
                );
            }

            self.resolve_block(&fn_stmt.body);

            self.scopes.pop();
            self.loop_stack = outer_loops;
        }
    }

    fn resolve_block(&mut self, block: &Block) {
        self.scopes.push(Scope::new(ScopeKind::Normal));
        self.resolve_stmts(&block.stmts);
        self.scopes.pop();
    }

    fn resolve_stmt<'ast>(&mut self, stmt: &'ast Stmt, sibling_fns: &mut Vec<&'ast Stmt>) {
        match &stmt.kind {
            StmtKind::Error => {}
            StmtKind::Fn(fn_stmt) => {
                self.define(fn_stmt.ident, Resolution::Fn(stmt.id));
                sibling_fns.push(stmt);
            }
            StmtKind::Let { ident, expr } => {
                self.define(*ident, Resolution::Let(stmt.id));
                self.resolve_expr(expr);
            }
            StmtKind::Loop { body } => {
                self.loop_stack.push(stmt.id);
                self.resolve_block(body);
                self.loop_stack.pop();
            }
            StmtKind::If {
                condition,
                truthy,
                falsy,
            } => {
                self.resolve_expr(condition);
                self.resolve_block(truthy);
                if let Some(falsy) = falsy {
                    self.resolve_block(falsy);
                }
            }
            StmtKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.resolve_expr(expr);
                }
            }
            StmtKind::Break => {
                let Some(loop_node) = self.loop_stack.last().copied() else {
                    self.diagnostics.report(stmt.line, "break outside loop");
                    return;
                };

                self.resolutions
                    .stmts
                    .insert(stmt.id, Resolution::Loop(loop_node));
            }
            StmtKind::Assign { subject, expr } => {
                self.resolve_expr(subject);
                self.resolve_expr(expr);
            }
            StmtKind::Expr { expr } => {
                self.resolve_expr(expr);
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Error => {}
            ExprKind::Ident(ident) => {
                let Some(resolution) = self.lookup(*ident) else {
                    self.diagnostics
                        .report(expr.line, format!("ident '{ident}' not defined"));
                    return;
                };

                self.resolutions.exprs.insert(expr.id, resolution);
            }
            ExprKind::Int(_) => {}
            ExprKind::Call { callee, args } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
        }
    }
}
