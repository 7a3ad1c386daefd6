//! Optimization passes over lowered functions.

use crate::middle::lir::Module;

pub mod simplify;

pub fn optimize(module: &mut Module) {
    for function in module.functions.values_mut() {
        simplify::simplify(function);
    }
}
