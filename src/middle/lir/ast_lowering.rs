//! Lowering from the AST to LIR. Each top level function lowers
//! independently with its own block and local id counters. Statements with
//! no valid lowering become poison instructions so analysis of the rest of
//! the function can continue.

use std::collections::BTreeMap;

use crate::{
    diagnostics::Diagnostics,
    frontend::ast::{self, ExprKind, NodeId, StmtKind},
    index::{Index, IndexVec},
    middle::{
        lir::{
            Block, BlockId, Function, Instruction, InstructionKind, Local, LocalDecl, LocalId,
            Module, Terminator, TerminatorKind, Value,
        },
        resolve::{Resolution, Resolutions},
        ty::Ty,
        type_check::Checker,
    },
};

/// The function contains a construct that cannot lower at all. A diagnostic
/// was reported and the function is dropped from the module.
struct LoweringAborted;

pub struct AstLowerer<'a> {
    ast: &'a [ast::Stmt],
    resolutions: &'a Resolutions,
    checker: &'a Checker,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> AstLowerer<'a> {
    pub fn lower(
        ast: &'a [ast::Stmt],
        resolutions: &'a Resolutions,
        checker: &'a Checker,
        diagnostics: &'a mut Diagnostics,
    ) -> Module {
        let lowerer = AstLowerer {
            ast,
            resolutions,
            checker,
            diagnostics,
        };

        let mut functions = BTreeMap::new();
        for stmt in lowerer.ast {
            let StmtKind::Fn(fn_stmt) = &stmt.kind else {
                continue;
            };

            let function = FunctionLowerer::new(
                lowerer.resolutions,
                lowerer.checker,
                lowerer.diagnostics,
            )
            .lower(stmt.id, fn_stmt);

            if let Ok(function) = function {
                functions.insert(stmt.id, function);
            }
        }

        Module { functions }
    }
}

struct FunctionLowerer<'a> {
    resolutions: &'a Resolutions,
    checker: &'a Checker,
    diagnostics: &'a mut Diagnostics,

    blocks: BTreeMap<BlockId, Block>,
    locals: IndexVec<LocalId, Local>,
    current_block: BlockId,
    next_block_id: usize,

    return_local: LocalId,
    param_locals: Vec<LocalId>,
    let_locals: BTreeMap<NodeId, LocalId>,

    return_block: BlockId,
    /// Break targets, keyed by the loop statements the breaks resolve to
    loop_exit_blocks: BTreeMap<NodeId, BlockId>,
}

impl<'a> FunctionLowerer<'a> {
    fn new(
        resolutions: &'a Resolutions,
        checker: &'a Checker,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        FunctionLowerer {
            resolutions,
            checker,
            diagnostics,
            blocks: BTreeMap::new(),
            locals: IndexVec::new(),
            current_block: BlockId::new(0),
            next_block_id: 0,
            return_local: LocalId::new(0),
            param_locals: Vec::new(),
            let_locals: BTreeMap::new(),
            return_block: BlockId::new(0),
            loop_exit_blocks: BTreeMap::new(),
        }
    }

    fn lower(
        mut self,
        node: NodeId,
        fn_stmt: &ast::FnStmt,
    ) -> Result<Function, LoweringAborted> {
        let ty = self.checker.fn_stmt_ty(node);
        let fn_ty = ty.as_fn().expect("fn statements have function types");

        self.return_local = self.push_local(fn_ty.return_ty.clone(), None);
        for (_, param_ty) in &fn_ty.params {
            let local = self.push_local(param_ty.clone(), None);
            self.param_locals.push(local);
        }

        self.return_block = self.new_block();

        let entry = self.new_block();
        self.push_block(entry);
        self.lower_ast_block(&fn_stmt.body)?;

        self.set_terminator(
            fn_stmt.body.line_exit,
            TerminatorKind::Jump {
                target: self.return_block,
            },
        );
        self.push_block(self.return_block);
        self.set_terminator(fn_stmt.body.line_exit, TerminatorKind::Return);

        Ok(Function {
            ident: fn_stmt.ident,
            blocks: self.blocks,
            locals: self.locals,
            entry,
            return_local: self.return_local,
            param_locals: self.param_locals,
        })
    }

    fn lower_ast_block(&mut self, block: &ast::Block) -> Result<(), LoweringAborted> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }

        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> Result<(), LoweringAborted> {
        let line = stmt.line;

        match &stmt.kind {
            StmtKind::Error => {
                self.push_instruction(line, InstructionKind::Error);
            }
            StmtKind::Fn(_) => {
                self.diagnostics
                    .report(line, "nested functions not supported");
                return Err(LoweringAborted);
            }
            StmtKind::Let { ident, expr } => {
                let ty = self.checker.let_stmt_ty(stmt.id);
                let local = self.push_local(
                    ty,
                    Some(LocalDecl {
                        node: stmt.id,
                        ident: *ident,
                        line,
                    }),
                );
                self.let_locals.insert(stmt.id, local);

                self.lower_expr(expr);
                self.push_instruction(line, InstructionKind::StoreLocal(local));
            }
            StmtKind::Loop { body } => {
                let entry = self.current_block;
                let loop_exit = self.new_block();
                let header = self.new_block();
                self.push_block(header);

                self.loop_exit_blocks.insert(stmt.id, loop_exit);
                self.lower_ast_block(body)?;
                let body_tail = self.current_block;

                self.terminate_block(entry, line, TerminatorKind::Jump { target: header });
                self.terminate_block(
                    body_tail,
                    body.line_exit,
                    TerminatorKind::Jump { target: header },
                );

                self.push_block(loop_exit);
            }
            StmtKind::If {
                condition,
                truthy,
                falsy,
            } => {
                self.lower_expr(condition);
                let entry = self.current_block;
                let exit = self.new_block();

                let truthy_block = self.push_new_block();
                self.lower_ast_block(truthy)?;
                self.set_terminator(truthy.line_exit, TerminatorKind::Jump { target: exit });

                let falsy_block = match falsy {
                    Some(falsy) => {
                        let block = self.push_new_block();
                        self.lower_ast_block(falsy)?;
                        self.set_terminator(
                            falsy.line_exit,
                            TerminatorKind::Jump { target: exit },
                        );
                        block
                    }
                    None => exit,
                };

                self.terminate_block(
                    entry,
                    line,
                    TerminatorKind::Branch {
                        truthy: truthy_block,
                        falsy: falsy_block,
                    },
                );
                self.push_block(exit);
            }
            StmtKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.lower_expr(expr);
                    self.push_instruction(line, InstructionKind::StoreLocal(self.return_local));
                }
                self.set_terminator(
                    line,
                    TerminatorKind::Jump {
                        target: self.return_block,
                    },
                );
                self.push_new_block();
            }
            StmtKind::Break => match self.resolutions.stmt(stmt.id) {
                Some(Resolution::Loop(node)) => {
                    let target = *self
                        .loop_exit_blocks
                        .get(&node)
                        .expect("break resolves to an enclosing loop");
                    self.set_terminator(line, TerminatorKind::Jump { target });
                    self.push_new_block();
                }
                // the resolver already rejected this break
                _ => self.push_instruction(line, InstructionKind::Error),
            },
            StmtKind::Assign { subject, expr } => {
                let local = match self.resolutions.expr(subject.id) {
                    Some(Resolution::Let(node)) => *self
                        .let_locals
                        .get(&node)
                        .expect("let was lowered before use"),
                    Some(Resolution::Param { index, .. }) => self.param_locals[index],
                    Some(Resolution::Fn(_) | Resolution::Loop(_)) => {
                        self.diagnostics.report(line, "cannot assign to expression");
                        self.push_instruction(line, InstructionKind::Error);
                        return Ok(());
                    }
                    None => {
                        // unresolved identifiers were already reported by
                        // the resolver; anything else is a bad target
                        if !matches!(subject.kind, ExprKind::Ident(_) | ExprKind::Error) {
                            self.diagnostics.report(line, "cannot assign to expression");
                        }
                        self.push_instruction(line, InstructionKind::Error);
                        return Ok(());
                    }
                };

                self.lower_expr(expr);
                self.push_instruction(line, InstructionKind::StoreLocal(local));
            }
            StmtKind::Expr { expr } => {
                self.lower_expr(expr);
                self.push_instruction(line, InstructionKind::Pop);
            }
        }

        Ok(())
    }

    fn lower_expr(&mut self, expr: &ast::Expr) {
        let line = expr.line;

        match &expr.kind {
            ExprKind::Error => {
                self.push_instruction(line, InstructionKind::Error);
            }
            ExprKind::Ident(_) => match self.resolutions.expr(expr.id) {
                Some(Resolution::Fn(node)) => {
                    let ty = self.checker.fn_stmt_ty(node);
                    self.push_instruction(
                        line,
                        InstructionKind::Push {
                            value: Value::Fn(node),
                            ty,
                        },
                    );
                }
                Some(Resolution::Param { index, .. }) => {
                    let local = self.param_locals[index];
                    self.push_instruction(line, InstructionKind::LoadLocal(local));
                }
                Some(Resolution::Let(node)) => {
                    let local = *self
                        .let_locals
                        .get(&node)
                        .expect("let was lowered before use");
                    self.push_instruction(line, InstructionKind::LoadLocal(local));
                }
                Some(Resolution::Loop(_)) => {
                    unreachable!("identifiers never resolve to loops")
                }
                // the resolver already rejected this identifier
                None => self.push_instruction(line, InstructionKind::Error),
            },
            ExprKind::Int(value) => {
                let ty = self.checker.expr_ty(expr.id);
                self.push_instruction(
                    line,
                    InstructionKind::Push {
                        value: Value::Int(*value),
                        ty,
                    },
                );
            }
            ExprKind::Call { callee, args } => {
                for arg in args {
                    self.lower_expr(arg);
                }
                self.lower_expr(callee);
                self.push_instruction(line, InstructionKind::Call { args: args.len() });
            }
            ExprKind::Binary { op, left, right } => {
                let ty = self.checker.expr_ty(expr.id);
                self.lower_expr(left);
                self.lower_expr(right);
                self.push_instruction(line, InstructionKind::Binary { op: *op, ty });
            }
        }
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(
            id,
            Block {
                id,
                instructions: Vec::new(),
                terminator: None,
            },
        );
        id
    }

    fn push_block(&mut self, id: BlockId) {
        self.current_block = id;
    }

    fn push_new_block(&mut self) -> BlockId {
        let id = self.new_block();
        self.push_block(id);
        id
    }

    fn current(&mut self) -> &mut Block {
        self.blocks
            .get_mut(&self.current_block)
            .expect("current block exists")
    }

    fn push_instruction(&mut self, line: u32, kind: InstructionKind) {
        self.current().instructions.push(Instruction { line, kind });
    }

    fn set_terminator(&mut self, line: u32, kind: TerminatorKind) {
        self.current().terminator = Some(Terminator { line, kind });
    }

    fn terminate_block(&mut self, id: BlockId, line: u32, kind: TerminatorKind) {
        let block = self.blocks.get_mut(&id).expect("block exists");
        block.terminator = Some(Terminator { line, kind });
    }

    fn push_local(&mut self, ty: Ty, decl: Option<LocalDecl>) -> LocalId {
        self.locals.push(Local { ty, decl })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        frontend::{SourceFile, parser::Parser},
        middle::resolve::Resolver,
    };

    fn lower_source(source: &str) -> (Module, Diagnostics) {
        let source = SourceFile::new_in_memory(source);
        let mut diagnostics = Diagnostics::new();
        let ast = Parser::parse(&source, &mut diagnostics);
        let resolutions = Resolver::resolve(&ast, &mut diagnostics);
        let checker = Checker::check(&ast, &resolutions, &mut diagnostics);
        let module = AstLowerer::lower(&ast, &resolutions, &checker, &mut diagnostics);
        (module, diagnostics)
    }

    fn only_function(module: &Module) -> &Function {
        assert_eq!(module.functions.len(), 1);
        module.functions.values().next().unwrap()
    }

    #[test]
    fn return_block_precedes_entry() {
        let (module, diagnostics) = lower_source("fn f() { }");
        assert!(!diagnostics.has_errors());

        let function = only_function(&module);
        assert_eq!(function.entry, BlockId::new(1));
        assert_eq!(
            function.block(BlockId::new(1)).terminator().kind,
            TerminatorKind::Jump {
                target: BlockId::new(0)
            }
        );
        assert_eq!(
            function.block(BlockId::new(0)).terminator().kind,
            TerminatorKind::Return
        );
    }

    #[test]
    fn loop_with_conditional_break() {
        let (module, diagnostics) = lower_source(indoc! {"
            fn f(a) {
                let s = 0;
                loop {
                    if a < 1 {
                        break;
                    }
                    s = s + a;
                    a = a + 0;
                }
                return s;
            }
        "});
        assert!(!diagnostics.has_errors());

        let function = only_function(&module);

        // entry stores the initial value of `s` and jumps to the loop header
        let entry = function.block(function.entry);
        assert!(matches!(
            entry.instructions.last(),
            Some(Instruction {
                kind: InstructionKind::StoreLocal(_),
                ..
            })
        ));
        let TerminatorKind::Jump { target: header } = entry.terminator().kind else {
            panic!("entry must jump to the loop header");
        };

        // the header evaluates the condition and branches, truthy towards
        // the break path and falsy into the body
        let header_block = function.block(header);
        let TerminatorKind::Branch { truthy, falsy } = header_block.terminator().kind else {
            panic!("loop header must branch");
        };

        let truthy_block = function.block(truthy);
        let loop_exit = match truthy_block.terminator().kind {
            TerminatorKind::Jump { target } => target,
            ref other => panic!("break must lower to a jump, found {other:?}"),
        };
        assert!(truthy_block.instructions.is_empty());

        // the loop exit leads to `return s`
        let exit_block = function.block(loop_exit);
        assert_eq!(
            exit_block.instructions.iter().map(|i| &i.kind).collect::<Vec<_>>(),
            [
                &InstructionKind::LoadLocal(LocalId::new(2)),
                &InstructionKind::StoreLocal(function.return_local),
            ],
        );
        assert_eq!(
            exit_block.terminator().kind,
            TerminatorKind::Jump {
                target: BlockId::new(0)
            }
        );

        // the body falls back around to the header
        let mut block = function.block(falsy);
        loop {
            match block.terminator().kind {
                TerminatorKind::Jump { target } if target == header => break,
                TerminatorKind::Jump { target } => block = function.block(target),
                ref other => panic!("body must jump back to the header, found {other:?}"),
            }
        }
    }

    #[test]
    fn call_arguments_lower_before_the_callee() {
        let (module, diagnostics) = lower_source("fn g(a, b) { } fn f() { g(1, 2); }");
        assert!(!diagnostics.has_errors());

        let function = module.functions.values().nth(1).unwrap();
        let entry = function.block(function.entry);
        let kinds: Vec<_> = entry.instructions.iter().map(|i| &i.kind).collect();

        assert!(matches!(
            kinds[..],
            [
                InstructionKind::Push {
                    value: Value::Int(1),
                    ..
                },
                InstructionKind::Push {
                    value: Value::Int(2),
                    ..
                },
                InstructionKind::Push {
                    value: Value::Fn(_),
                    ..
                },
                InstructionKind::Call { args: 2 },
                InstructionKind::Pop,
            ]
        ));
    }

    #[test]
    fn nested_functions_abort_the_enclosing_function() {
        let (module, diagnostics) = lower_source("fn f() { fn g() { } }");

        assert!(module.functions.is_empty());
        assert!(
            diagnostics
                .iter()
                .any(|d| d.message == "nested functions not supported")
        );
    }

    #[test]
    fn assigning_to_a_function_is_poisoned() {
        let (module, diagnostics) = lower_source("fn g() { } fn f() { g = 1; }");

        assert!(
            diagnostics
                .iter()
                .any(|d| d.message == "cannot assign to expression")
        );

        let function = module.functions.values().nth(1).unwrap();
        let entry = function.block(function.entry);
        assert!(matches!(
            entry.instructions[..],
            [Instruction {
                kind: InstructionKind::Error,
                ..
            }]
        ));
    }

    #[test]
    fn assigning_to_a_call_is_poisoned() {
        let (module, diagnostics) = lower_source("fn f() { } fn g() { f() = 1; }");

        assert!(
            diagnostics
                .iter()
                .any(|d| d.message == "cannot assign to expression")
        );

        let function = module.functions.values().nth(1).unwrap();
        let entry = function.block(function.entry);
        assert!(
            entry
                .instructions
                .iter()
                .any(|i| matches!(i.kind, InstructionKind::Error))
        );
    }

    #[test]
    fn every_block_is_terminated() {
        let (module, diagnostics) = lower_source(indoc! {"
            fn f(a) {
                loop {
                    if a == 0 {
                        break;
                    } else {
                        a = a + 1;
                    }
                    return a;
                }
            }
        "});
        assert!(!diagnostics.has_errors());

        let function = only_function(&module);
        for block in function.blocks.values() {
            assert!(block.terminator.is_some(), "block {:?} is unsealed", block.id);
        }
    }
}
