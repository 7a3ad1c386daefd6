//! Textual LIR listings. The output is deterministic modulo terminal
//! styling: blocks print in ascending id order and locals in slot order.

use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use crate::{
    index::Index,
    middle::lir::{self, InstructionKind, TerminatorKind, Value},
};

pub fn render_module(module: &lir::Module) -> String {
    module
        .functions
        .values()
        .map(render_function)
        .join("\n\n")
}

pub fn render_function(function: &lir::Function) -> String {
    let mut out = String::new();

    let params = function
        .param_locals
        .iter()
        .map(|local| local.to_string())
        .join(", ");
    let _ = writeln!(
        out,
        "{} {}({params}) {{",
        "fn".magenta(),
        function.ident.value().blue()
    );

    for (local_id, local) in function.locals.enumerate() {
        let marker = if local_id == function.return_local {
            " // return"
        } else if function.param_locals.contains(&local_id) {
            " // param"
        } else {
            ""
        };

        let _ = writeln!(out, "    {local_id}: {}{}", local.ty, marker.bright_black());
    }
    out.push('\n');

    for block in function.blocks.values() {
        if block.id == function.entry {
            let _ = writeln!(out, "    {}", "// entry".bright_black());
        }

        let _ = writeln!(out, "    {} {{", format!(".b{}", block.id.index()).bright_red());
        for instruction in &block.instructions {
            let _ = writeln!(out, "        {instruction}");
        }
        match &block.terminator {
            Some(terminator) => {
                let _ = writeln!(out, "        {terminator}");
            }
            None => {
                let _ = writeln!(out, "        <no terminator>");
            }
        }
        let _ = writeln!(out, "    }}");
    }

    out.push('}');
    out
}

impl core::fmt::Display for lir::Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            InstructionKind::Error => write!(f, "{}", "error".red()),
            InstructionKind::Push { value, ty } => {
                write!(f, "{} {ty} ", "push".cyan())?;
                match value {
                    Value::Int(value) => write!(f, "{}", value.to_string().purple()),
                    // the pushed function is already named by its type
                    Value::Fn(_) => match ty.as_fn() {
                        Some(fn_ty) => write!(f, "{} {}", "fn".magenta(), fn_ty.ident),
                        None => write!(f, "{}", "fn".magenta()),
                    },
                }
            }
            InstructionKind::Pop => write!(f, "{}", "pop".cyan()),
            InstructionKind::Binary { op, ty } => {
                write!(f, "{} {ty}", op.to_string().cyan())
            }
            InstructionKind::LoadLocal(local) => {
                write!(f, "{} {local}", "load_local".cyan())
            }
            InstructionKind::StoreLocal(local) => {
                write!(f, "{} {local}", "store_local".cyan())
            }
            InstructionKind::Call { args } => {
                write!(f, "{} {}", "call".cyan(), args.to_string().purple())
            }
        }
    }
}

impl core::fmt::Display for lir::Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TerminatorKind::Error => write!(f, "{}", "error".red()),
            TerminatorKind::Return => write!(f, "{}", "return".cyan()),
            TerminatorKind::Jump { target } => {
                write!(f, "{} {}", "jmp".cyan(), target.to_string().bright_red())
            }
            TerminatorKind::Branch { truthy, falsy } => {
                write!(
                    f,
                    "{} {} {} {}",
                    "if".cyan(),
                    truthy.to_string().bright_red(),
                    "else".cyan(),
                    falsy.to_string().bright_red()
                )
            }
        }
    }
}

impl core::fmt::Display for lir::BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".b{}", self.index())
    }
}

impl core::fmt::Display for lir::LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("%{}", self.index()).yellow())
    }
}
