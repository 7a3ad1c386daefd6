//! A generic fixed point dataflow solver over LIR control flow graphs,
//! with the two analyses built on it: liveness and dominators.
//!
//! An [`Analysis`] provides the lattice pieces: an initial fact, a meet
//! operator and a per block transfer function. The solver sweeps the blocks
//! in an order that fits the direction of the analysis and recomputes facts
//! until a whole sweep changes nothing. Facts form finite sets here, so
//! convergence is bounded by the block count times the universe size.

use std::collections::{BTreeMap, BTreeSet};

use crate::middle::{
    cfg,
    lir::{Block, BlockId, Function, InstructionKind, LocalId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

pub trait Analysis {
    type Fact: Clone + PartialEq;

    const DIRECTION: Direction;

    /// The fact every block starts from before any sweep.
    fn initial_fact(&self, function: &Function) -> Self::Fact;

    /// A fixed fact for blocks the equations must not touch, like the
    /// entry block of a dominator analysis.
    fn boundary_fact(&self, function: &Function, block: &Block) -> Option<Self::Fact>;

    fn meet(&self, accumulated: Self::Fact, other: &Self::Fact) -> Self::Fact;

    /// Combines the fact flowing into a block with the block's own effects.
    fn transfer(&self, function: &Function, block: &Block, incoming: Self::Fact) -> Self::Fact;
}

pub struct DataflowResults<A: Analysis> {
    pub facts: BTreeMap<BlockId, A::Fact>,
}

impl<A: Analysis> DataflowResults<A> {
    pub fn fact(&self, block: BlockId) -> &A::Fact {
        self.facts.get(&block).expect("fact exists for every block")
    }
}

pub fn solve<A: Analysis>(analysis: &A, function: &Function) -> DataflowResults<A> {
    let order = match A::DIRECTION {
        Direction::Forward => cfg::reverse_postorder(function),
        Direction::Backward => cfg::reverse_graph_reverse_postorder(function),
    };

    // the neighbors each block's fact is recomputed from
    let dependencies: BTreeMap<BlockId, Vec<BlockId>> = match A::DIRECTION {
        Direction::Forward => cfg::predecessor_map(function)
            .into_iter()
            .map(|(id, predecessors)| (id, predecessors.into_iter().collect()))
            .collect(),
        Direction::Backward => function
            .blocks
            .values()
            .map(|block| (block.id, cfg::successors(block)))
            .collect(),
    };

    let mut facts: BTreeMap<BlockId, A::Fact> = function
        .blocks
        .keys()
        .map(|id| (*id, analysis.initial_fact(function)))
        .collect();

    loop {
        let mut changed = false;

        for &id in &order {
            let block = function.block(id);

            let fact = match analysis.boundary_fact(function, block) {
                Some(fact) => fact,
                None => {
                    let mut accumulated: Option<A::Fact> = None;
                    for dependency in &dependencies[&id] {
                        let neighbor = &facts[dependency];
                        accumulated = Some(match accumulated {
                            None => neighbor.clone(),
                            Some(accumulated) => analysis.meet(accumulated, neighbor),
                        });
                    }

                    let incoming =
                        accumulated.unwrap_or_else(|| analysis.initial_fact(function));
                    analysis.transfer(function, block, incoming)
                }
            };

            if facts[&id] != fact {
                facts.insert(id, fact);
                changed = true;
            }
        }

        if !changed {
            return DataflowResults { facts };
        }
    }
}

/// Backward liveness. The fact attached to a block is its live-in set: the
/// locals whose value may be read before being overwritten, on some path
/// starting at the top of the block.
pub struct Liveness {
    /// Locals read before any write within the block
    use_sets: BTreeMap<BlockId, BTreeSet<LocalId>>,
    /// Locals written anywhere within the block
    kill_sets: BTreeMap<BlockId, BTreeSet<LocalId>>,
}

impl Liveness {
    pub fn new(function: &Function) -> Self {
        let mut use_sets = BTreeMap::new();
        let mut kill_sets = BTreeMap::new();

        for block in function.blocks.values() {
            let mut uses = BTreeSet::new();
            let mut kills = BTreeSet::new();

            for instruction in &block.instructions {
                match instruction.kind {
                    InstructionKind::LoadLocal(local) => {
                        if !kills.contains(&local) {
                            uses.insert(local);
                        }
                    }
                    InstructionKind::StoreLocal(local) => {
                        kills.insert(local);
                    }
                    _ => {}
                }
            }

            use_sets.insert(block.id, uses);
            kill_sets.insert(block.id, kills);
        }

        Liveness {
            use_sets,
            kill_sets,
        }
    }
}

impl Analysis for Liveness {
    type Fact = BTreeSet<LocalId>;

    const DIRECTION: Direction = Direction::Backward;

    fn initial_fact(&self, _function: &Function) -> Self::Fact {
        BTreeSet::new()
    }

    fn boundary_fact(&self, _function: &Function, _block: &Block) -> Option<Self::Fact> {
        None
    }

    fn meet(&self, mut accumulated: Self::Fact, other: &Self::Fact) -> Self::Fact {
        accumulated.extend(other.iter().copied());
        accumulated
    }

    fn transfer(&self, _function: &Function, block: &Block, incoming: Self::Fact) -> Self::Fact {
        let mut fact = self.use_sets[&block.id].clone();
        fact.extend(
            incoming
                .into_iter()
                .filter(|local| !self.kill_sets[&block.id].contains(local)),
        );
        fact
    }
}

pub struct LivenessResults {
    results: DataflowResults<Liveness>,
}

impl LivenessResults {
    pub fn live_in(&self, block: BlockId) -> &BTreeSet<LocalId> {
        self.results.fact(block)
    }
}

pub fn liveness(function: &Function) -> LivenessResults {
    let analysis = Liveness::new(function);
    LivenessResults {
        results: solve(&analysis, function),
    }
}

/// Forward dominator analysis. A block's fact is the set of blocks every
/// path from the entry to it must pass through, itself included.
struct Dominators;

impl Analysis for Dominators {
    type Fact = BTreeSet<BlockId>;

    const DIRECTION: Direction = Direction::Forward;

    fn initial_fact(&self, function: &Function) -> Self::Fact {
        function.blocks.keys().copied().collect()
    }

    fn boundary_fact(&self, function: &Function, block: &Block) -> Option<Self::Fact> {
        (block.id == function.entry).then(|| BTreeSet::from([function.entry]))
    }

    fn meet(&self, accumulated: Self::Fact, other: &Self::Fact) -> Self::Fact {
        accumulated.intersection(other).copied().collect()
    }

    fn transfer(&self, _function: &Function, block: &Block, mut incoming: Self::Fact) -> Self::Fact {
        incoming.insert(block.id);
        incoming
    }
}

pub fn dominators(function: &Function) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
    solve(&Dominators, function).facts
}

/// Locals that can be read before ever being written: the live-in set of
/// the entry block, minus the slots the caller fills (parameters and the
/// return slot). Each flagged local's declaration points back at source.
pub fn uninitialized_locals(function: &Function) -> Vec<LocalId> {
    let liveness = liveness(function);

    liveness
        .live_in(function.entry)
        .iter()
        .copied()
        .filter(|local| *local != function.return_local)
        .filter(|local| !function.param_locals.contains(local))
        .collect()
}
