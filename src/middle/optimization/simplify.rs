//! Block level cleanup of lowered functions. Lowering allocates blocks
//! eagerly, so fresh functions are full of unreachable blocks, straight
//! line chains and empty forwarding blocks. Three sub-passes remove them:
//!
//!   1. unreachable block elimination
//!   2. fusion of blocks with a one-to-one parent
//!   3. elision of empty blocks that only forward to another block
//!
//! The sequence repeats until a whole round changes nothing, so the result
//! is a fixed point and running [`simplify`] again is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use crate::middle::{
    cfg,
    lir::{BlockId, Function, TerminatorKind},
};

pub fn simplify(function: &mut Function) {
    loop {
        let mut changed = false;
        changed |= remove_unreachable_blocks(function);
        changed |= fuse_straight_line_blocks(function);
        changed |= elide_empty_blocks(function);

        if !changed {
            return;
        }
    }
}

fn remove_unreachable_blocks(function: &mut Function) -> bool {
    let reachable = cfg::reachable(function);
    let before = function.blocks.len();

    function.blocks.retain(|id, _| reachable.contains(id));
    function.blocks.len() != before
}

/// Fuses pairs where every edge out of a parent targets the same child and
/// that child has no other predecessors. The child's instructions and
/// terminator move into the parent and the child is deleted. Pairs fuse
/// one at a time so chains collapse without ever following a stale id.
fn fuse_straight_line_blocks(function: &mut Function) -> bool {
    let mut changed = false;

    while let Some((parent, child)) = find_fusable_pair(function) {
        let child_block = function
            .blocks
            .remove(&child)
            .expect("fusable child exists");
        let parent_block = function
            .blocks
            .get_mut(&parent)
            .expect("fusable parent exists");

        parent_block.instructions.extend(child_block.instructions);
        parent_block.terminator = child_block.terminator;
        changed = true;
    }

    changed
}

fn find_fusable_pair(function: &Function) -> Option<(BlockId, BlockId)> {
    let predecessors = cfg::predecessor_map(function);

    for block in function.blocks.values() {
        let targets = cfg::successors(block);
        let Some((&target, rest)) = targets.split_first() else {
            continue;
        };
        if !rest.iter().all(|other| *other == target) {
            continue;
        }
        if target == block.id || target == function.entry {
            continue;
        }
        if predecessors[&target] != BTreeSet::from([block.id]) {
            continue;
        }

        return Some((block.id, target));
    }

    None
}

/// Deletes blocks with no instructions whose terminator is a plain jump,
/// redirecting every edge into them at their final destination. Chains of
/// such blocks resolve transitively; chains that loop back on themselves
/// are left alone.
fn elide_empty_blocks(function: &mut Function) -> bool {
    let mut forwards: BTreeMap<BlockId, BlockId> = BTreeMap::new();
    for block in function.blocks.values() {
        if !block.instructions.is_empty() {
            continue;
        }
        if let Some(TerminatorKind::Jump { target }) =
            block.terminator.as_ref().map(|terminator| &terminator.kind)
        {
            if *target != block.id {
                forwards.insert(block.id, *target);
            }
        }
    }

    let mut resolved: BTreeMap<BlockId, BlockId> = BTreeMap::new();
    for (&start, &first) in &forwards {
        let mut seen = BTreeSet::from([start]);
        let mut current = first;

        let destination = loop {
            if seen.contains(&current) {
                break None;
            }
            match forwards.get(&current) {
                Some(&next) => {
                    seen.insert(current);
                    current = next;
                }
                None => break Some(current),
            }
        };

        if let Some(destination) = destination {
            resolved.insert(start, destination);
        }
    }

    if resolved.is_empty() {
        return false;
    }

    for (id, destination) in &resolved {
        if function.entry == *id {
            function.entry = *destination;
        }
        function.blocks.remove(id);
    }

    for block in function.blocks.values_mut() {
        cfg::rewrite_successors(block, |target| {
            resolved.get(&target).copied().unwrap_or(target)
        });
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::Index,
        middle::{
            cfg::tests::{function_with_block_contents, function_with_blocks},
            lir::{Instruction, InstructionKind, LocalId},
        },
    };

    fn jmp(target: usize) -> TerminatorKind {
        TerminatorKind::Jump {
            target: BlockId::new(target),
        }
    }

    fn branch(truthy: usize, falsy: usize) -> TerminatorKind {
        TerminatorKind::Branch {
            truthy: BlockId::new(truthy),
            falsy: BlockId::new(falsy),
        }
    }

    fn load(local: usize) -> Instruction {
        Instruction {
            line: 1,
            kind: InstructionKind::LoadLocal(LocalId::new(local)),
        }
    }

    fn store(local: usize) -> Instruction {
        Instruction {
            line: 1,
            kind: InstructionKind::StoreLocal(LocalId::new(local)),
        }
    }

    fn block_ids(function: &Function) -> Vec<usize> {
        function.blocks.keys().map(|id| id.index()).collect()
    }

    #[test]
    fn unreachable_blocks_are_removed() {
        let mut function = function_with_blocks(&[
            (0, jmp(2)),
            (1, jmp(2)),
            (2, TerminatorKind::Return),
            (3, jmp(3)),
        ]);

        assert!(remove_unreachable_blocks(&mut function));
        assert_eq!(block_ids(&function), [0, 2]);
    }

    #[test]
    fn single_edge_single_predecessor_pairs_fuse() {
        let mut function = function_with_block_contents(&[
            (0, vec![store(1)], jmp(1)),
            (1, vec![load(1)], TerminatorKind::Return),
        ]);

        assert!(fuse_straight_line_blocks(&mut function));
        assert_eq!(block_ids(&function), [0]);

        let merged = function.block(BlockId::new(0));
        assert_eq!(merged.instructions.len(), 2);
        assert_eq!(merged.terminator().kind, TerminatorKind::Return);
    }

    #[test]
    fn fusion_collapses_whole_chains() {
        let mut function = function_with_block_contents(&[
            (0, vec![store(1)], jmp(1)),
            (1, vec![store(2)], jmp(2)),
            (2, vec![store(3)], TerminatorKind::Return),
        ]);

        assert!(fuse_straight_line_blocks(&mut function));
        assert_eq!(block_ids(&function), [0]);
        assert_eq!(function.block(BlockId::new(0)).instructions.len(), 3);
    }

    #[test]
    fn fusion_leaves_shared_targets_alone() {
        let mut function = function_with_block_contents(&[
            (0, vec![], branch(1, 2)),
            (1, vec![load(1)], jmp(3)),
            (2, vec![load(2)], jmp(3)),
            (3, vec![load(3)], TerminatorKind::Return),
        ]);

        // 3 has two predecessors and the branch arms are not one-to-one
        // parents, so nothing fuses
        assert!(!fuse_straight_line_blocks(&mut function));
        assert_eq!(block_ids(&function), [0, 1, 2, 3]);
    }

    #[test]
    fn fusion_never_absorbs_the_entry() {
        let mut function = function_with_block_contents(&[
            (2, vec![store(1)], jmp(0)),
            (0, vec![load(1)], TerminatorKind::Return),
        ]);
        // entry is 2, and 0 is fusable into it, not the other way around
        assert_eq!(function.entry, BlockId::new(2));

        assert!(fuse_straight_line_blocks(&mut function));
        assert_eq!(block_ids(&function), [2]);
        assert_eq!(function.entry, BlockId::new(2));
    }

    #[test]
    fn empty_jump_chains_resolve_transitively() {
        let mut function = function_with_block_contents(&[
            (0, vec![store(1)], jmp(1)),
            (1, vec![], jmp(2)),
            (2, vec![], jmp(3)),
            (3, vec![load(1)], TerminatorKind::Return),
        ]);

        assert!(elide_empty_blocks(&mut function));
        assert_eq!(block_ids(&function), [0, 3]);
        assert_eq!(
            function.block(BlockId::new(0)).terminator().kind,
            jmp(3)
        );
    }

    #[test]
    fn eliding_the_entry_moves_the_entry_forward() {
        let mut function = function_with_block_contents(&[
            (0, vec![], jmp(1)),
            (1, vec![load(1)], TerminatorKind::Return),
        ]);

        assert!(elide_empty_blocks(&mut function));
        assert_eq!(function.entry, BlockId::new(1));
        assert_eq!(block_ids(&function), [1]);
    }

    #[test]
    fn empty_jump_cycles_are_left_alone() {
        let mut function = function_with_block_contents(&[
            (0, vec![store(1)], branch(1, 3)),
            (1, vec![], jmp(2)),
            (2, vec![], jmp(1)),
            (3, vec![], TerminatorKind::Return),
        ]);

        assert!(!elide_empty_blocks(&mut function));
        assert_eq!(block_ids(&function), [0, 1, 2, 3]);
    }

    #[test]
    fn empty_diamonds_collapse_to_a_single_block() {
        // if with two empty arms, as lowered from `if c { } else { }`
        let mut function = function_with_block_contents(&[
            (0, vec![load(1)], branch(1, 2)),
            (1, vec![], jmp(3)),
            (2, vec![], jmp(3)),
            (3, vec![store(2)], TerminatorKind::Return),
        ]);

        simplify(&mut function);

        assert_eq!(block_ids(&function), [0]);
        let merged = function.block(BlockId::new(0));
        assert_eq!(merged.instructions.len(), 2);
        assert_eq!(merged.terminator().kind, TerminatorKind::Return);
    }

    #[test]
    fn simplify_reaches_a_fixed_point() {
        let mut function = function_with_block_contents(&[
            (0, vec![store(1)], jmp(2)),
            (1, vec![], jmp(0)),
            (2, vec![], branch(3, 4)),
            (3, vec![], jmp(5)),
            (4, vec![], jmp(5)),
            (5, vec![load(1)], TerminatorKind::Return),
        ]);

        simplify(&mut function);
        let settled = format!("{function:?}");

        simplify(&mut function);
        assert_eq!(format!("{function:?}"), settled);
    }
}
