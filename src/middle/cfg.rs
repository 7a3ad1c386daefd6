//! Control flow graph utilities over LIR functions. Blocks are only ever
//! referenced by id, so the graph is derived on demand from terminators
//! instead of being stored alongside the blocks.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashSet;

use crate::middle::lir::{Block, BlockId, Function, TerminatorKind};

/// The ids a block's terminator can transfer control to. Unsealed and
/// poisoned blocks have no successors, like returns.
pub fn successors(block: &Block) -> Vec<BlockId> {
    match block.terminator.as_ref().map(|terminator| &terminator.kind) {
        None | Some(TerminatorKind::Error | TerminatorKind::Return) => Vec::new(),
        Some(TerminatorKind::Jump { target }) => vec![*target],
        Some(TerminatorKind::Branch { truthy, falsy }) => vec![*truthy, *falsy],
    }
}

/// Applies `rewrite` to every outgoing edge of a block in place.
pub fn rewrite_successors(block: &mut Block, mut rewrite: impl FnMut(BlockId) -> BlockId) {
    let Some(terminator) = block.terminator.as_mut() else {
        return;
    };

    match &mut terminator.kind {
        TerminatorKind::Error | TerminatorKind::Return => {}
        TerminatorKind::Jump { target } => *target = rewrite(*target),
        TerminatorKind::Branch { truthy, falsy } => {
            *truthy = rewrite(*truthy);
            *falsy = rewrite(*falsy);
        }
    }
}

pub fn predecessor_map(function: &Function) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
    let mut predecessors: BTreeMap<BlockId, BTreeSet<BlockId>> = function
        .blocks
        .keys()
        .map(|id| (*id, BTreeSet::new()))
        .collect();

    for block in function.blocks.values() {
        for successor in successors(block) {
            predecessors
                .get_mut(&successor)
                .expect("terminator targets an existing block")
                .insert(block.id);
        }
    }

    predecessors
}

/// Every block reachable from the entry along terminator edges.
pub fn reachable(function: &Function) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![function.entry];

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        for successor in successors(function.block(id)) {
            if !seen.contains(&successor) {
                stack.push(successor);
            }
        }
    }

    seen
}

pub fn postorder(function: &Function) -> Vec<BlockId> {
    let edges = forward_edges(function);
    let order = dfs_postorder(&edges, [function.entry]);
    with_leftovers(function, order)
}

pub fn reverse_postorder(function: &Function) -> Vec<BlockId> {
    let edges = forward_edges(function);
    let mut order = dfs_postorder(&edges, [function.entry]);
    order.reverse();
    with_leftovers(function, order)
}

/// Reverse postorder of the reversed graph, rooted at the blocks with no
/// successors. Backward analyses converge fastest in this order.
pub fn reverse_graph_reverse_postorder(function: &Function) -> Vec<BlockId> {
    let edges = reverse_edges(function);
    let roots: Vec<BlockId> = function
        .blocks
        .values()
        .filter(|block| successors(block).is_empty())
        .map(|block| block.id)
        .collect();

    let mut order = dfs_postorder(&edges, roots);
    order.reverse();
    with_leftovers(function, order)
}

fn forward_edges(function: &Function) -> BTreeMap<BlockId, Vec<BlockId>> {
    function
        .blocks
        .values()
        .map(|block| (block.id, successors(block)))
        .collect()
}

fn reverse_edges(function: &Function) -> BTreeMap<BlockId, Vec<BlockId>> {
    predecessor_map(function)
        .into_iter()
        .map(|(id, predecessors)| (id, predecessors.into_iter().collect()))
        .collect()
}

fn dfs_postorder(
    edges: &BTreeMap<BlockId, Vec<BlockId>>,
    roots: impl IntoIterator<Item = BlockId>,
) -> Vec<BlockId> {
    let mut visited: HashSet<BlockId> = HashSet::new();
    let mut order = Vec::new();

    for root in roots {
        if !visited.insert(root) {
            continue;
        }

        let mut stack = vec![(root, 0usize)];
        while let Some(frame) = stack.last_mut() {
            let (id, index) = *frame;
            let targets = &edges[&id];

            if let Some(&next) = targets.get(index) {
                frame.1 += 1;
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                order.push(id);
                stack.pop();
            }
        }
    }

    order
}

/// Blocks the traversal never saw still get a deterministic position, in
/// ascending id order at the end.
fn with_leftovers(function: &Function, mut order: Vec<BlockId>) -> Vec<BlockId> {
    if order.len() == function.blocks.len() {
        return order;
    }

    let seen: BTreeSet<BlockId> = order.iter().copied().collect();
    order.extend(function.blocks.keys().filter(|id| !seen.contains(id)));
    order
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        index::{Index, IndexVec},
        middle::{
            lir::{Instruction, Terminator},
            ty::Ty,
        },
    };

    /// Builds a function from (id, terminator kind) pairs. The first block
    /// listed is the entry, and the function has no locals.
    pub(crate) fn function_with_blocks(blocks: &[(usize, TerminatorKind)]) -> Function {
        function_with_block_contents(
            &blocks
                .iter()
                .map(|(id, kind)| (*id, Vec::new(), kind.clone()))
                .collect::<Vec<_>>(),
        )
    }

    pub(crate) fn function_with_block_contents(
        blocks: &[(usize, Vec<Instruction>, TerminatorKind)],
    ) -> Function {
        let entry = BlockId::new(blocks.first().expect("at least one block").0);
        let blocks: BTreeMap<BlockId, Block> = blocks
            .iter()
            .map(|(id, instructions, kind)| {
                let id = BlockId::new(*id);
                (
                    id,
                    Block {
                        id,
                        instructions: instructions.clone(),
                        terminator: Some(Terminator {
                            line: 1,
                            kind: kind.clone(),
                        }),
                    },
                )
            })
            .collect();

        let mut locals = IndexVec::new();
        let return_local = locals.push(crate::middle::lir::Local {
            ty: Ty::int(),
            decl: None,
        });

        Function {
            ident: crate::frontend::intern::Symbol::new("test"),
            blocks,
            locals,
            entry,
            return_local,
            param_locals: Vec::new(),
        }
    }

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

    fn ids(order: &[BlockId]) -> Vec<usize> {
        order.iter().map(|id| id.index()).collect()
    }

    #[test]
    fn reachability_ignores_blocks_behind_no_edges() {
        let function = function_with_blocks(&[
            (0, jmp(1)),
            (1, TerminatorKind::Return),
            (2, jmp(0)),
        ]);

        let reachable = reachable(&function);
        assert_eq!(
            reachable,
            [BlockId::new(0), BlockId::new(1)].into_iter().collect()
        );
    }

    #[test]
    fn predecessors_follow_both_branch_edges() {
        let function = function_with_blocks(&[
            (0, branch(1, 2)),
            (1, jmp(3)),
            (2, jmp(3)),
            (3, TerminatorKind::Return),
        ]);

        let predecessors = predecessor_map(&function);
        assert_eq!(
            predecessors[&BlockId::new(3)],
            [BlockId::new(1), BlockId::new(2)].into_iter().collect()
        );
        assert!(predecessors[&BlockId::new(0)].is_empty());
    }

    #[test]
    fn reverse_postorder_visits_predecessors_first() {
        let function = function_with_blocks(&[
            (0, branch(1, 2)),
            (1, jmp(3)),
            (2, jmp(3)),
            (3, TerminatorKind::Return),
        ]);

        let order = reverse_postorder(&function);
        assert_eq!(order[0], BlockId::new(0));
        assert_eq!(order[3], BlockId::new(3));

        let position = |id: usize| {
            order
                .iter()
                .position(|block| *block == BlockId::new(id))
                .unwrap()
        };
        assert!(position(0) < position(1));
        assert!(position(0) < position(2));
        assert!(position(1) < position(3));
        assert!(position(2) < position(3));
    }

    #[test]
    fn reverse_graph_order_starts_at_the_exits() {
        let function = function_with_blocks(&[
            (0, jmp(1)),
            (1, branch(2, 3)),
            (2, jmp(1)),
            (3, TerminatorKind::Return),
        ]);

        let order = reverse_graph_reverse_postorder(&function);
        assert_eq!(order[0], BlockId::new(3));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn unreached_blocks_keep_a_stable_tail_position() {
        let function = function_with_blocks(&[
            (0, TerminatorKind::Return),
            (5, jmp(5)),
            (2, jmp(0)),
        ]);

        assert_eq!(ids(&reverse_postorder(&function)), [0, 2, 5]);
    }
}
