use std::path::PathBuf;

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};

use rillc::{
    diagnostics::Diagnostics,
    frontend::{SourceFile, SourceFileOrigin, parser::Parser},
    middle::{
        dataflow,
        lir::{ast_lowering::AstLowerer, pretty_print},
        optimization,
        resolve::Resolver,
        type_check::Checker,
    },
};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_file: PathBuf,
}

fn main() {
    let args = Args::parse();

    if !args.source_file.exists() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!(
                    "Source file '{}' does not exist!",
                    args.source_file.display()
                ),
            )
            .exit()
    }

    if !args.source_file.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!(
                    "Input path '{}' is not a file!",
                    args.source_file.display()
                ),
            )
            .exit()
    }

    let contents = std::fs::read_to_string(&args.source_file)
        .expect("Failed to read input file (or invalid UTF-8)");

    let source = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.source_file),
    };

    let mut diagnostics = Diagnostics::new();
    let ast = Parser::parse(&source, &mut diagnostics);
    let resolutions = Resolver::resolve(&ast, &mut diagnostics);
    let checker = Checker::check(&ast, &resolutions, &mut diagnostics);

    if diagnostics.has_errors() {
        diagnostics.print_all(&source.origin);
        std::process::exit(1);
    }

    let mut module = AstLowerer::lower(&ast, &resolutions, &checker, &mut diagnostics);

    println!("{}", pretty_print::render_module(&module));

    println!("\n=== AFTER OPTIMIZATION ===\n");
    optimization::optimize(&mut module);
    println!("{}", pretty_print::render_module(&module));

    for function in module.functions.values() {
        for local in dataflow::uninitialized_locals(function) {
            // the return and parameter slots were already filtered out,
            // everything left traces back to a `let`
            if let Some(decl) = &function.locals[local].decl {
                diagnostics.report(
                    decl.line,
                    format!("variable '{}' may be used uninitialized", decl.ident),
                );
            }
        }
    }

    if diagnostics.has_errors() {
        diagnostics.print_all(&source.origin);
        std::process::exit(1);
    }
}
