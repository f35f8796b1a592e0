//! The landmark graph: nodes over fact/action/task/method atoms with four
//! independent ordering relations, and the leaf-first fulfilment
//! progression evaluated along search paths.

use crate::decomposition::TaskId;
use crate::strips::FactId;
use fixedbitset::FixedBitSet;
use std::collections::BTreeSet;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmAtomKind {
    Fact,
    Action,
    Task,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmAtom {
    pub kind: LmAtomKind,
    pub id: usize,
    pub negated: bool,
}

impl LmAtom {
    pub fn fact(id: FactId) -> Self {
        Self {
            kind: LmAtomKind::Fact,
            id,
            negated: false,
        }
    }

    pub fn action(id: usize) -> Self {
        Self {
            kind: LmAtomKind::Action,
            id,
            negated: false,
        }
    }

    pub fn task(id: TaskId) -> Self {
        Self {
            kind: LmAtomKind::Task,
            id,
            negated: false,
        }
    }

    pub fn method(id: usize) -> Self {
        Self {
            kind: LmAtomKind::Method,
            id,
            negated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmConnective {
    Conjunctive,
    Disjunctive,
}

#[derive(Debug, Clone)]
pub struct LmNode {
    pub connective: LmConnective,
    pub atoms: Vec<LmAtom>,
    pub is_true_in_goal: bool,
}

impl LmNode {
    pub fn conjunctive(atoms: Vec<LmAtom>) -> Self {
        Self {
            connective: LmConnective::Conjunctive,
            atoms,
            is_true_in_goal: false,
        }
    }

    pub fn disjunctive(atoms: Vec<LmAtom>) -> Self {
        Self {
            connective: LmConnective::Disjunctive,
            atoms,
            is_true_in_goal: false,
        }
    }

    /// The single atom category of this node, or `None` if mixed.
    pub fn category(&self) -> Option<LmAtomKind> {
        let first = self.atoms.first()?.kind;
        self.atoms
            .iter()
            .all(|a| a.kind == first)
            .then_some(first)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmOrderingKind {
    Necessary,
    GreedyNecessary,
    Natural,
    Reasonable,
    ObedientReasonable,
}

#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    pub preds: Vec<Vec<usize>>,
    pub succs: Vec<Vec<usize>>,
}

impl Adjacency {
    fn new(n: usize) -> Self {
        Self {
            preds: vec![Vec::new(); n],
            succs: vec![Vec::new(); n],
        }
    }

    fn add(&mut self, pred: usize, succ: usize) {
        self.preds[succ].push(pred);
        self.succs[pred].push(succ);
    }

    fn is_consistent(&self) -> bool {
        for (pred, succs) in self.succs.iter().enumerate() {
            for &succ in succs {
                if !self.preds[succ].contains(&pred) {
                    return false;
                }
            }
        }
        for (succ, preds) in self.preds.iter().enumerate() {
            for &pred in preds {
                if !self.succs[pred].contains(&succ) {
                    return false;
                }
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct LmGraph {
    pub nodes: Vec<LmNode>,
    pub all: Adjacency,
    pub natural: Adjacency,
    pub greedy_necessary: Adjacency,
    pub reasonable: Adjacency,
}

/// Everything a progression step may look at: the state after the
/// transition, the tasks still in the network, and what was just applied.
#[derive(Debug, Clone, Copy)]
pub struct LmContext<'a> {
    pub state: &'a BTreeSet<FactId>,
    pub contained_tasks: &'a [TaskId],
    pub applied_action: Option<usize>,
    pub applied_method: Option<usize>,
}

impl<'a> LmContext<'a> {
    pub fn state_only(state: &'a BTreeSet<FactId>) -> Self {
        Self {
            state,
            contained_tasks: &[],
            applied_action: None,
            applied_method: None,
        }
    }
}

/// Per-path fulfilment marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmPayload {
    pub fulfilled: FixedBitSet,
}

impl LmGraph {
    pub fn new(nodes: Vec<LmNode>) -> Self {
        let n = nodes.len();
        Self {
            nodes,
            all: Adjacency::new(n),
            natural: Adjacency::new(n),
            greedy_necessary: Adjacency::new(n),
            reasonable: Adjacency::new(n),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a typed ordering. Orderings pointing from state-level nodes
    /// (facts, actions) to decomposition-level nodes (tasks, methods) are
    /// inverted; orderings touching a mixed-category node are dropped with
    /// a warning, as are orderings of an unknown combination.
    pub fn add_ordering(&mut self, pred: usize, succ: usize, kind: LmOrderingKind) {
        debug_assert!(pred < self.nodes.len() && succ < self.nodes.len());

        let pred_cat = self.nodes[pred].category();
        let succ_cat = self.nodes[succ].category();
        let (Some(pred_cat), Some(succ_cat)) = (pred_cat, succ_cat) else {
            warn!(pred, succ, "dropping landmark ordering with mixed atom categories");
            return;
        };
        let state_level =
            |c: LmAtomKind| matches!(c, LmAtomKind::Fact | LmAtomKind::Action);
        let (pred, succ) = if state_level(pred_cat) && !state_level(succ_cat) {
            // decomposition precedes execution
            (succ, pred)
        } else {
            (pred, succ)
        };

        self.all.add(pred, succ);
        match kind {
            LmOrderingKind::Natural => self.natural.add(pred, succ),
            LmOrderingKind::Necessary | LmOrderingKind::GreedyNecessary => {
                self.greedy_necessary.add(pred, succ)
            }
            LmOrderingKind::Reasonable | LmOrderingKind::ObedientReasonable => {
                self.reasonable.add(pred, succ)
            }
        }
    }

    /// Flags nodes whose atoms are all positive goal facts.
    pub fn mark_true_in_goal(&mut self, goal: &BTreeSet<FactId>) {
        if goal.is_empty() {
            return;
        }
        for node in &mut self.nodes {
            node.is_true_in_goal = !node.atoms.is_empty()
                && node.atoms.iter().all(|a| {
                    a.kind == LmAtomKind::Fact && !a.negated && goal.contains(&a.id)
                });
        }
    }

    fn atom_fulfilled(&self, atom: &LmAtom, ctx: &LmContext<'_>) -> bool {
        match atom.kind {
            LmAtomKind::Action => {
                if atom.negated {
                    !ctx.contained_tasks.contains(&atom.id)
                } else {
                    ctx.applied_action == Some(atom.id)
                }
            }
            LmAtomKind::Task => ctx.contained_tasks.contains(&atom.id) != atom.negated,
            LmAtomKind::Fact => ctx.state.contains(&atom.id) != atom.negated,
            LmAtomKind::Method => ctx.applied_method == Some(atom.id),
        }
    }

    pub fn node_fulfilled(&self, node: usize, ctx: &LmContext<'_>) -> bool {
        let node = &self.nodes[node];
        match node.connective {
            LmConnective::Conjunctive => {
                node.atoms.iter().all(|a| self.atom_fulfilled(a, ctx))
            }
            LmConnective::Disjunctive => {
                node.atoms.iter().any(|a| self.atom_fulfilled(a, ctx))
            }
        }
    }

    /// A node may only become fulfilled once every predecessor in the
    /// overall ordering already is, so activation respects the leaf-first
    /// order.
    fn is_leaf(&self, node: usize, payload: &LmPayload) -> bool {
        self.all.preds[node]
            .iter()
            .all(|&p| payload.fulfilled.contains(p))
    }

    pub fn initial_payload(&self, ctx: &LmContext<'_>) -> LmPayload {
        let empty = LmPayload {
            fulfilled: FixedBitSet::with_capacity(self.len()),
        };
        self.progress(&empty, ctx)
    }

    pub fn progress(&self, parent: &LmPayload, ctx: &LmContext<'_>) -> LmPayload {
        let mut out = parent.clone();
        for i in 0..self.len() {
            if !out.fulfilled.contains(i)
                && self.node_fulfilled(i, ctx)
                && self.is_leaf(i, parent)
            {
                out.fulfilled.insert(i);
            }
        }
        out
    }

    /// §consistency: every arc is mirrored and refers to existing nodes.
    pub fn check_consistency(&self) -> bool {
        [&self.all, &self.natural, &self.greedy_necessary, &self.reasonable]
            .iter()
            .all(|adj| {
                adj.preds.len() == self.len()
                    && adj.succs.len() == self.len()
                    && adj.is_consistent()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact_graph() -> LmGraph {
        let mut g = LmGraph::new(vec![
            LmNode::conjunctive(vec![LmAtom::fact(0)]),
            LmNode::conjunctive(vec![LmAtom::fact(1)]),
        ]);
        g.add_ordering(0, 1, LmOrderingKind::GreedyNecessary);
        g
    }

    #[test]
    fn ordering_tables_stay_mirrored() {
        let g = fact_graph();
        assert!(g.check_consistency());
        assert_eq!(g.all.succs[0], vec![1]);
        assert_eq!(g.greedy_necessary.preds[1], vec![0]);
        assert!(g.natural.succs[0].is_empty());
    }

    #[test]
    fn progression_is_leaf_first() {
        let g = fact_graph();
        // both facts hold, but node 1 must wait for node 0 to be fulfilled
        // in the parent payload first
        let state: BTreeSet<FactId> = [0, 1].into_iter().collect();
        let ctx = LmContext::state_only(&state);
        let first = g.initial_payload(&ctx);
        assert!(first.fulfilled.contains(0));
        assert!(!first.fulfilled.contains(1));
        let second = g.progress(&first, &ctx);
        assert!(second.fulfilled.contains(1));
    }

    #[test]
    fn fulfilment_is_monotone_along_a_path() {
        let g = fact_graph();
        let state: BTreeSet<FactId> = [0].into_iter().collect();
        let ctx = LmContext::state_only(&state);
        let payload = g.initial_payload(&ctx);
        assert!(payload.fulfilled.contains(0));

        // fact 0 no longer holds, yet the mark is kept
        let state2: BTreeSet<FactId> = BTreeSet::new();
        let ctx2 = LmContext::state_only(&state2);
        let next = g.progress(&payload, &ctx2);
        assert!(next.fulfilled.contains(0));
    }

    #[test]
    fn mixed_direction_orderings_are_inverted() {
        let mut g = LmGraph::new(vec![
            LmNode::conjunctive(vec![LmAtom::fact(0)]),
            LmNode::conjunctive(vec![LmAtom::task(3)]),
        ]);
        // fact -> task gets flipped to task -> fact
        g.add_ordering(0, 1, LmOrderingKind::Natural);
        assert_eq!(g.natural.succs[1], vec![0]);
        assert!(g.natural.succs[0].is_empty());
    }

    #[test]
    fn goal_marking_requires_positive_fact_atoms() {
        let mut g = LmGraph::new(vec![
            LmNode::conjunctive(vec![LmAtom::fact(0)]),
            LmNode::conjunctive(vec![LmAtom::action(0)]),
        ]);
        g.mark_true_in_goal(&[0].into_iter().collect());
        assert!(g.nodes[0].is_true_in_goal);
        assert!(!g.nodes[1].is_true_in_goal);
    }
}
