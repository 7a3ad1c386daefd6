//! LIR (Low-level Intermediate Representation). A stack machine form where
//! loops and conditionals are reduced to blocks and jumps and expression
//! trees are flattened into ordered post fix operations. Every instruction
//! remembers the source line it came from so diagnostics computed on this
//! form can still point back at the program text.

use std::collections::BTreeMap;

use crate::{
    frontend::{
        ast::{BinaryOp, NodeId},
        intern::Symbol,
    },
    index::{IndexVec, simple_index},
    middle::ty::Ty,
};

pub mod ast_lowering;
pub mod pretty_print;

#[derive(Debug)]
pub struct Module {
    pub functions: BTreeMap<NodeId, Function>,
}

#[derive(Debug)]
pub struct Function {
    pub ident: Symbol,
    pub blocks: BTreeMap<BlockId, Block>,
    pub locals: IndexVec<LocalId, Local>,
    pub entry: BlockId,
    /// Local 0, written by lowered `return` statements and read by the caller
    pub return_local: LocalId,
    pub param_locals: Vec<LocalId>,
}

impl Function {
    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks.get(&id).expect("block exists in function")
    }
}

simple_index! {
    /// Identifies an LIR block within a single function
    pub struct BlockId;
}

simple_index! {
    /// Identifies a storage slot within a single function's frame
    pub struct LocalId;
}

#[derive(Debug)]
pub struct Block {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    /// Always present once lowering of the function finishes
    pub terminator: Option<Terminator>,
}

impl Block {
    pub fn terminator(&self) -> &Terminator {
        self.terminator
            .as_ref()
            .expect("block was sealed by lowering")
    }
}

#[derive(Debug, Clone)]
pub struct Local {
    pub ty: Ty,
    /// The `let` this slot was allocated for, absent for the return and
    /// parameter slots
    pub decl: Option<LocalDecl>,
}

#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub node: NodeId,
    pub ident: Symbol,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub line: u32,
    pub kind: InstructionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// Placeholder lowered from statements the front end already rejected
    Error,
    Push { value: Value, ty: Ty },
    Pop,
    /// Pops two operands, pushes one result
    Binary { op: BinaryOp, ty: Ty },
    LoadLocal(LocalId),
    StoreLocal(LocalId),
    /// Pops the callee and `args` operands, pushes the return value
    Call { args: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Terminator {
    pub line: u32,
    pub kind: TerminatorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminatorKind {
    Error,
    Return,
    Jump { target: BlockId },
    Branch { truthy: BlockId, falsy: BlockId },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Fn(NodeId),
}
