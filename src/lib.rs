//! The Rill bootstrap compiler middle end: parsing, name resolution, type
//! checking, lowering to a block-structured stack machine IR, block
//! simplification and dataflow analysis over the result.

pub mod diagnostics;
pub mod frontend;
pub mod index;
pub mod middle;
