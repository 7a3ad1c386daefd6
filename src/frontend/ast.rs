//! The syntax tree produced by the parser. Every statement and expression
//! carries a stable [`NodeId`] (one counter per parse) and the 1-based line
//! it starts on; resolution and type results are keyed by those ids.

use crate::{frontend::intern::Symbol, index::simple_index};

simple_index! {
    /// Identifies an AST statement or expression
    pub struct NodeId;
}

#[derive(Debug)]
pub struct Stmt {
    pub id: NodeId,
    pub line: u32,
    pub kind: StmtKind,
}

#[derive(Debug)]
pub enum StmtKind {
    /// Placeholder produced by parser error recovery
    Error,
    Fn(Box<FnStmt>),
    Let { ident: Symbol, expr: Expr },
    Loop { body: Block },
    If {
        condition: Expr,
        truthy: Block,
        falsy: Option<Block>,
    },
    Return { expr: Option<Expr> },
    Break,
    Assign { subject: Expr, expr: Expr },
    Expr { expr: Expr },
}

#[derive(Debug)]
pub struct FnStmt {
    pub ident: Symbol,
    pub params: Vec<Symbol>,
    pub body: Block,
}

#[derive(Debug)]
pub struct Block {
    pub line_entry: u32,
    pub line_exit: u32,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Expr {
    pub id: NodeId,
    pub line: u32,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    /// Placeholder produced by parser error recovery
    Error,
    Ident(Symbol),
    Int(i64),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOp {
    #[strum(serialize = "lt")]
    Lt,
    #[strum(serialize = "eq")]
    Eq,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "mul")]
    Mul,
}

impl BinaryOp {
    /// The operator as it appears in source
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Lt => "<",
            BinaryOp::Eq => "==",
            BinaryOp::Add => "+",
            BinaryOp::Mul => "*",
        }
    }
}
