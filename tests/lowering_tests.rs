use indoc::indoc;
use rillc::{
    diagnostics::Diagnostics,
    index::Index,
    frontend::{SourceFile, parser::Parser},
    middle::{
        cfg,
        lir::{Instruction, InstructionKind, Module, TerminatorKind},
        lir::ast_lowering::AstLowerer,
        resolve::Resolver,
        type_check::Checker,
    },
};

fn lower(source: &str) -> Module {
    let source = SourceFile::new_in_memory(source);
    let mut diagnostics = Diagnostics::new();
    let ast = Parser::parse(&source, &mut diagnostics);
    let resolutions = Resolver::resolve(&ast, &mut diagnostics);
    let checker = Checker::check(&ast, &resolutions, &mut diagnostics);
    assert!(
        !diagnostics.has_errors(),
        "unexpected diagnostics: {:?}",
        diagnostics.iter().collect::<Vec<_>>()
    );
    AstLowerer::lower(&ast, &resolutions, &checker, &mut diagnostics)
}

const COUNTDOWN: &str = indoc! {"
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
"};

#[test]
fn every_block_is_sealed_and_every_edge_resolves() {
    let module = lower(COUNTDOWN);

    for function in module.functions.values() {
        for block in function.blocks.values() {
            assert!(
                block.terminator.is_some(),
                "block {:?} has no terminator",
                block.id
            );
            for successor in cfg::successors(block) {
                assert!(
                    function.blocks.contains_key(&successor),
                    "edge {:?} -> {successor:?} dangles",
                    block.id
                );
            }
        }
    }
}

#[test]
fn functions_have_a_single_return_block() {
    let module = lower(COUNTDOWN);
    let function = module.functions.values().next().unwrap();

    let returning: Vec<_> = function
        .blocks
        .values()
        .filter(|block| block.terminator().kind == TerminatorKind::Return)
        .collect();
    assert_eq!(returning.len(), 1);
}

#[test]
fn frame_layout_is_return_then_params_then_lets() {
    let module = lower("fn f(a, b) { let c = 0; }");
    let function = module.functions.values().next().unwrap();

    assert_eq!(function.return_local.index(), 0);
    assert_eq!(
        function
            .param_locals
            .iter()
            .map(|local| local.index())
            .collect::<Vec<_>>(),
        [1, 2]
    );
    assert_eq!(function.locals.len(), 4);
    assert!(function.locals[function.return_local].decl.is_none());

    let let_local = function
        .locals
        .enumerate()
        .find_map(|(_, local)| local.decl.as_ref())
        .unwrap();
    assert_eq!(let_local.ident.value(), "c");
    assert_eq!(let_local.line, 1);
}

#[test]
fn return_statements_store_through_the_return_slot() {
    let module = lower(COUNTDOWN);
    let function = module.functions.values().next().unwrap();

    // some block ends with "load s, store return slot" and jumps to the
    // block that returns
    let return_block = function
        .blocks
        .values()
        .find(|block| block.terminator().kind == TerminatorKind::Return)
        .unwrap();

    let stores_return = function.blocks.values().find(|block| {
        matches!(
            block.instructions.as_slice(),
            [
                Instruction {
                    kind: InstructionKind::LoadLocal(_),
                    ..
                },
                Instruction {
                    kind: InstructionKind::StoreLocal(store),
                    ..
                },
            ] if *store == function.return_local
        ) && block.terminator().kind
            == TerminatorKind::Jump {
                target: return_block.id,
            }
    });
    assert!(stores_return.is_some());
}

#[test]
fn loop_headers_branch_between_exit_and_body() {
    let module = lower(COUNTDOWN);
    let function = module.functions.values().next().unwrap();

    let entry = function.block(function.entry);
    let TerminatorKind::Jump { target: header } = entry.terminator().kind else {
        panic!("entry must jump to the loop header");
    };

    let TerminatorKind::Branch { truthy, falsy } = function.block(header).terminator().kind
    else {
        panic!("header must branch on the condition");
    };

    // the truthy arm is the break path: following its jumps never comes
    // back to the header and reaches the return-storing block
    let mut current = truthy;
    for _ in 0..function.blocks.len() {
        match function.block(current).terminator().kind {
            TerminatorKind::Jump { target } => {
                assert_ne!(target, header, "break path must leave the loop");
                current = target;
            }
            TerminatorKind::Return => break,
            ref other => panic!("unexpected terminator on the break path: {other:?}"),
        }
    }

    // the falsy arm is the body: it flows back to the header
    let mut current = falsy;
    let mut reached_header = false;
    for _ in 0..function.blocks.len() {
        match function.block(current).terminator().kind {
            TerminatorKind::Jump { target } if target == header => {
                reached_header = true;
                break;
            }
            TerminatorKind::Jump { target } => current = target,
            ref other => panic!("unexpected terminator in the loop body: {other:?}"),
        }
    }
    assert!(reached_header);
}

#[test]
fn breaking_out_of_every_loop_level_targets_the_right_exit() {
    let module = lower(indoc! {"
        fn f(a) {
            loop {
                loop {
                    break;
                }
                break;
            }
            return a;
        }
    "});
    let function = module.functions.values().next().unwrap();

    // both breaks are reachable jumps and everything still seals
    for block in function.blocks.values() {
        assert!(block.terminator.is_some());
    }
    assert!(cfg::reachable(function).len() >= 4);
}

#[test]
fn sibling_functions_lower_in_source_order() {
    let module = lower("fn f() { g(); } fn g() { }");
    assert_eq!(module.functions.len(), 2);

    let idents: Vec<_> = module
        .functions
        .values()
        .map(|function| function.ident.value())
        .collect();
    assert_eq!(idents, ["f", "g"]);
}
