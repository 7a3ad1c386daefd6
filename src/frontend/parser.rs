use crate::{
    diagnostics::Diagnostics,
    frontend::{
        SourceFile,
        ast::{BinaryOp, Block, Expr, ExprKind, FnStmt, NodeId, Stmt, StmtKind},
        intern::Symbol,
        lexer::{Keyword, Lexer, Token, TokenKind},
    },
    index::Index,
};

/// Recursive descent parser over the lexed token stream. Parse errors are
/// reported to the sink and recovered into `Error` nodes so the later
/// phases always receive a tree.
#[derive(Debug)]
pub struct Parser<'source, 'diag> {
    source: &'source SourceFile,
    tokens: Vec<Token>,
    position: usize,
    eaten: Option<Token>,
    last_line: u32,
    next_node_id: u32,
    diagnostics: &'diag mut Diagnostics,
}

/// Binary operators from loosest to tightest binding
const BINARY_OPS: [(TokenKind, BinaryOp, u8); 4] = [
    (TokenKind::LessThan, BinaryOp::Lt, 4),
    (TokenKind::DoubleEquals, BinaryOp::Eq, 3),
    (TokenKind::Plus, BinaryOp::Add, 2),
    (TokenKind::Asterisk, BinaryOp::Mul, 1),
];

impl<'source, 'diag> Parser<'source, 'diag> {
    pub fn parse(
        source: &'source SourceFile,
        diagnostics: &'diag mut Diagnostics,
    ) -> Vec<Stmt> {
        let tokens = Lexer::tokenize(source, diagnostics);

        let mut parser = Self {
            source,
            tokens,
            position: 0,
            eaten: None,
            last_line: 1,
            next_node_id: 0,
            diagnostics,
        };

        let mut stmts = Vec::new();
        while !parser.done() {
            stmts.push(parser.parse_stmt());
        }

        stmts
    }

    fn parse_block(&mut self) -> Block {
        let line_entry = self.current().map(|t| t.line).unwrap_or(self.last_line);
        self.step();

        let mut stmts = Vec::new();
        while !self.done() && !self.test(TokenKind::CloseBrace) {
            stmts.push(self.parse_stmt());
        }

        if !self.eat(TokenKind::CloseBrace) {
            self.report("expected '}'");
            return Block {
                line_entry,
                line_exit: line_entry,
                stmts: Vec::new(),
            };
        }

        let line_exit = self.eaten.map(|t| t.line).unwrap_or(line_entry);

        Block {
            line_entry,
            line_exit,
            stmts,
        }
    }

    fn parse_stmt(&mut self) -> Stmt {
        if self.test(TokenKind::Keyword(Keyword::Fn)) {
            self.parse_fn_stmt()
        } else if self.test(TokenKind::Keyword(Keyword::Let)) {
            self.parse_let_stmt()
        } else if self.test(TokenKind::Keyword(Keyword::Loop)) {
            self.parse_loop_stmt()
        } else if self.test(TokenKind::Keyword(Keyword::If)) {
            self.parse_if_stmt()
        } else if self.test(TokenKind::Keyword(Keyword::Return)) {
            self.parse_return_stmt()
        } else if self.test(TokenKind::Keyword(Keyword::Break)) {
            self.parse_break_stmt()
        } else {
            let subject = self.parse_expr();
            let line = subject.line;

            let kind = if self.eat(TokenKind::Equals) {
                let expr = self.parse_expr();
                StmtKind::Assign { subject, expr }
            } else {
                StmtKind::Expr { expr: subject }
            };

            if !self.eat(TokenKind::Semicolon) {
                self.report("expected ';'");
                return self.stmt(StmtKind::Error, line);
            }

            self.stmt(kind, line)
        }
    }

    fn parse_fn_stmt(&mut self) -> Stmt {
        let line = self.current_line();
        self.step();

        let Some(ident) = self.eat_identifier() else {
            self.report("expected 'ident'");
            return self.stmt(StmtKind::Error, line);
        };

        if !self.eat(TokenKind::OpenParen) {
            self.report("expected '('");
            return self.stmt(StmtKind::Error, line);
        }

        let mut params = Vec::new();
        if !self.done() && !self.test(TokenKind::CloseParen) {
            loop {
                let Some(param) = self.eat_identifier() else {
                    self.report("expected 'ident'");
                    return self.stmt(StmtKind::Error, line);
                };
                params.push(param);

                if self.done() || self.test(TokenKind::CloseParen) {
                    break;
                }

                if !self.eat(TokenKind::Comma) {
                    self.report("expected ','");
                    return self.stmt(StmtKind::Error, line);
                }

                // trailing comma
                if self.test(TokenKind::CloseParen) {
                    break;
                }
            }
        }

        if !self.eat(TokenKind::CloseParen) {
            self.report("expected ')'");
            return self.stmt(StmtKind::Error, line);
        }

        if !self.test(TokenKind::OpenBrace) {
            self.report("expected block");
            return self.stmt(StmtKind::Error, line);
        }
        let body = self.parse_block();

        self.stmt(
            StmtKind::Fn(Box::new(FnStmt {
                ident,
                params,
                body,
            })),
            line,
        )
    }

    fn parse_let_stmt(&mut self) -> Stmt {
        let line = self.current_line();
        self.step();

        let Some(ident) = self.eat_identifier() else {
            self.report("expected 'ident'");
            return self.stmt(StmtKind::Error, line);
        };

        if !self.eat(TokenKind::Equals) {
            self.report("expected '='");
            return self.stmt(StmtKind::Error, line);
        }

        let expr = self.parse_expr();

        if !self.eat(TokenKind::Semicolon) {
            self.report("expected ';'");
            return self.stmt(StmtKind::Error, line);
        }

        self.stmt(StmtKind::Let { ident, expr }, line)
    }

    fn parse_loop_stmt(&mut self) -> Stmt {
        let line = self.current_line();
        self.step();

        if !self.test(TokenKind::OpenBrace) {
            self.report("expected block");
            return self.stmt(StmtKind::Error, line);
        }
        let body = self.parse_block();

        self.stmt(StmtKind::Loop { body }, line)
    }

    fn parse_if_stmt(&mut self) -> Stmt {
        let line = self.current_line();
        self.step();

        let condition = self.parse_expr();

        if !self.test(TokenKind::OpenBrace) {
            self.report("expected block");
            return self.stmt(StmtKind::Error, line);
        }
        let truthy = self.parse_block();

        if !self.eat(TokenKind::Keyword(Keyword::Else)) {
            return self.stmt(
                StmtKind::If {
                    condition,
                    truthy,
                    falsy: None,
                },
                line,
            );
        }

        if !self.test(TokenKind::OpenBrace) {
            self.report("expected block");
            return self.stmt(StmtKind::Error, line);
        }
        let falsy = self.parse_block();

        self.stmt(
            StmtKind::If {
                condition,
                truthy,
                falsy: Some(falsy),
            },
            line,
        )
    }

    fn parse_return_stmt(&mut self) -> Stmt {
        let line = self.current_line();
        self.step();

        if self.eat(TokenKind::Semicolon) {
            return self.stmt(StmtKind::Return { expr: None }, line);
        }

        let expr = self.parse_expr();

        if !self.eat(TokenKind::Semicolon) {
            self.report("expected ';'");
            return self.stmt(StmtKind::Error, line);
        }

        self.stmt(StmtKind::Return { expr: Some(expr) }, line)
    }

    fn parse_break_stmt(&mut self) -> Stmt {
        let line = self.current_line();
        self.step();

        if !self.eat(TokenKind::Semicolon) {
            self.report("expected ';'");
            return self.stmt(StmtKind::Error, line);
        }

        self.stmt(StmtKind::Break, line)
    }

    fn parse_expr(&mut self) -> Expr {
        self.parse_binary_expr(4)
    }

    fn parse_binary_expr(&mut self, precedence: u8) -> Expr {
        if precedence == 0 {
            return self.parse_postfix_expr();
        }

        let mut left = self.parse_binary_expr(precedence - 1);

        let mut should_continue = true;
        while should_continue {
            should_continue = false;

            for (token, op, op_precedence) in BINARY_OPS {
                if precedence >= op_precedence && self.eat(token) {
                    let right = self.parse_binary_expr(precedence - 1);
                    let line = left.line;

                    left = self.expr(
                        ExprKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        line,
                    );

                    should_continue = true;
                    break;
                }
            }
        }

        left
    }

    fn parse_postfix_expr(&mut self) -> Expr {
        let mut expr = self.parse_operand_expr();

        while self.eat(TokenKind::OpenParen) {
            let mut args = Vec::new();

            if !self.done() && !self.test(TokenKind::CloseParen) {
                loop {
                    args.push(self.parse_expr());

                    if self.done() || self.test(TokenKind::CloseParen) {
                        break;
                    }

                    if !self.eat(TokenKind::Comma) {
                        self.report("expected ','");
                        return self.expr(ExprKind::Error, self.last_line);
                    }

                    if self.test(TokenKind::CloseParen) {
                        break;
                    }
                }
            }

            if !self.eat(TokenKind::CloseParen) {
                self.report("expected ')'");
                return self.expr(ExprKind::Error, self.last_line);
            }

            let line = expr.line;
            expr = self.expr(
                ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                },
                line,
            );
        }

        expr
    }

    fn parse_operand_expr(&mut self) -> Expr {
        if let Some(ident) = self.eat_identifier() {
            let line = self.eaten.map(|t| t.line).unwrap_or(self.last_line);
            return self.expr(ExprKind::Ident(ident), line);
        }

        if self.eat(TokenKind::IntegerLiteral) {
            let token = self.eaten.unwrap();
            let text = self.source.value_of_span(token.span);

            let Ok(value) = text.parse::<i64>() else {
                self.report("integer literal out of range");
                return self.expr(ExprKind::Error, token.line);
            };

            return self.expr(ExprKind::Int(value), token.line);
        }

        self.report("expected expr");
        // skip the offending token so statement parsing always advances
        self.step();
        self.expr(ExprKind::Error, self.last_line)
    }

    fn stmt(&mut self, kind: StmtKind, line: u32) -> Stmt {
        Stmt {
            id: self.create_node_id(),
            line,
            kind,
        }
    }

    fn expr(&mut self, kind: ExprKind, line: u32) -> Expr {
        Expr {
            id: self.create_node_id(),
            line,
            kind,
        }
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id as usize);
        self.next_node_id += 1;
        id
    }

    fn eat_identifier(&mut self) -> Option<Symbol> {
        if !self.eat(TokenKind::Identifier) {
            return None;
        }

        let token = self.eaten.unwrap();
        Some(Symbol::new(self.source.value_of_span(token.span)))
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.test(kind) {
            self.eaten = self.current();
            self.step();
            return true;
        }

        false
    }

    fn test(&self, kind: TokenKind) -> bool {
        self.current().is_some_and(|t| t.kind == kind)
    }

    fn step(&mut self) {
        if let Some(token) = self.current() {
            self.last_line = token.line;
        }

        self.position += 1;
    }

    fn current(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn current_line(&self) -> u32 {
        self.current().map(|t| t.line).unwrap_or(self.last_line)
    }

    fn done(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn report(&mut self, message: &str) {
        self.diagnostics.report(self.last_line, message);
    }
}
