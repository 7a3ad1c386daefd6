//! Names are resolved and types are checked here, then the AST is lowered
//! into the block-structured LIR that the optimization and dataflow passes
//! operate on.

pub mod cfg;
pub mod dataflow;
pub mod lir;
pub mod optimization;
pub mod resolve;
pub mod ty;
pub mod type_check;
