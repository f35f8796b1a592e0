//! LM-cut landmark extraction over the ground task: repeated hmax
//! computations, each yielding one disjunctive action landmark (the cut)
//! whose minimum cost is subtracted before the next round.

use crate::landmarks::{LmAtom, LmGraph, LmNode};
use crate::strips::{FactId, StripsTask};
use std::collections::BTreeSet;
use tracing::info;

const INFINITY: i64 = i64::MAX / 4;

struct JustificationGraph<'a> {
    task: &'a StripsTask,
    costs: Vec<i64>,
    hmax: Vec<i64>,
    /// Precondition-choice function: the most expensive precondition.
    pcf: Vec<Option<FactId>>,
}

impl<'a> JustificationGraph<'a> {
    fn new(task: &'a StripsTask) -> Self {
        Self {
            task,
            costs: task.ops.iter().map(|o| o.cost.max(0) as i64).collect(),
            hmax: Vec::new(),
            pcf: Vec::new(),
        }
    }

    /// hmax over facts plus the pcf per operator. Bellman-Ford style
    /// relaxation; the task sizes the analysis stage sees keep this cheap.
    fn compute_hmax(&mut self, state: &BTreeSet<FactId>) {
        let n = self.task.facts.len();
        self.hmax = vec![INFINITY; n];
        for &f in state {
            self.hmax[f] = 0;
        }
        loop {
            let mut changed = false;
            for (op_id, op) in self.task.ops.iter().enumerate() {
                let pre_max = op
                    .pre
                    .iter()
                    .map(|&f| self.hmax[f])
                    .max()
                    .unwrap_or(0);
                if pre_max >= INFINITY {
                    continue;
                }
                let through = pre_max + self.costs[op_id];
                for &a in &op.add_eff {
                    if through < self.hmax[a] {
                        self.hmax[a] = through;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        self.pcf = self
            .task
            .ops
            .iter()
            .map(|op| {
                op.pre
                    .iter()
                    .copied()
                    .max_by_key(|&f| (self.hmax[f], std::cmp::Reverse(f)))
            })
            .collect();
    }

    fn goal_value(&self, goal: &BTreeSet<FactId>) -> i64 {
        goal.iter().map(|&f| self.hmax[f]).max().unwrap_or(0)
    }

    /// The goal zone: facts with a zero-cost justification path to the
    /// most expensive goal fact.
    fn goal_zone(&self, goal: &BTreeSet<FactId>) -> BTreeSet<FactId> {
        let goal_fact = goal
            .iter()
            .copied()
            .max_by_key(|&f| (self.hmax[f], std::cmp::Reverse(f)));
        let mut zone: BTreeSet<FactId> = BTreeSet::new();
        let Some(goal_fact) = goal_fact else {
            return zone;
        };
        let mut stack = vec![goal_fact];
        while let Some(f) = stack.pop() {
            if !zone.insert(f) {
                continue;
            }
            for (op_id, op) in self.task.ops.iter().enumerate() {
                if self.costs[op_id] != 0 {
                    continue;
                }
                let Some(pcf) = self.pcf[op_id] else { continue };
                if op.add_eff.contains(&f) && !zone.contains(&pcf) {
                    stack.push(pcf);
                }
            }
        }
        zone
    }

    /// Operators crossing from the init-reachable zone into the goal zone.
    fn cut(&self, state: &BTreeSet<FactId>, zone: &BTreeSet<FactId>) -> BTreeSet<usize> {
        let mut cut: BTreeSet<usize> = BTreeSet::new();
        let mut before: BTreeSet<FactId> = BTreeSet::new();
        let mut stack: Vec<FactId> = state.iter().copied().collect();
        while let Some(f) = stack.pop() {
            if zone.contains(&f) || !before.insert(f) {
                continue;
            }
            for (op_id, op) in self.task.ops.iter().enumerate() {
                if self.pcf[op_id] != Some(f) {
                    continue;
                }
                if op.add_eff.iter().any(|a| zone.contains(a)) {
                    cut.insert(op_id);
                }
                for &a in &op.add_eff {
                    if !zone.contains(&a) && !before.contains(&a) {
                        stack.push(a);
                    }
                }
            }
        }
        cut
    }
}

/// Runs LM-cut from `state`; returns the heuristic value and the cuts, or
/// `None` for the value when the goal is unreachable in the relaxation.
pub fn lm_cut(task: &StripsTask, state: &BTreeSet<FactId>) -> (Option<i64>, Vec<BTreeSet<usize>>) {
    let mut graph = JustificationGraph::new(task);
    let mut cuts: Vec<BTreeSet<usize>> = Vec::new();
    let mut h = 0i64;

    loop {
        graph.compute_hmax(state);
        let goal_value = graph.goal_value(&task.goal);
        if goal_value >= INFINITY {
            return (None, cuts);
        }
        if goal_value == 0 {
            break;
        }

        let zone = graph.goal_zone(&task.goal);
        let cut = graph.cut(state, &zone);
        if cut.is_empty() {
            break;
        }
        let m = cut.iter().map(|&o| graph.costs[o]).min().unwrap();
        for &o in &cut {
            graph.costs[o] -= m;
        }
        h += m;
        cuts.push(cut);
    }
    (Some(h), cuts)
}

/// Builds a landmark graph with one disjunctive action node per cut.
pub fn create_lm_cut_landmarks(task: &StripsTask) -> LmGraph {
    let (_, cuts) = lm_cut(task, &task.init);
    let nodes = cuts
        .into_iter()
        .map(|cut| LmNode::disjunctive(cut.into_iter().map(LmAtom::action).collect()))
        .collect::<Vec<_>>();
    info!(landmarks = nodes.len(), "extracted LM-cut landmarks");
    LmGraph::new(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LmAtomKind, LmConnective};
    use crate::strips::{Facts, StripsOp};

    /// pre p, add q, del p; init {p}, goal {q}.
    fn single_action_task() -> StripsTask {
        let mut facts = Facts::default();
        let p = facts.add_artificial("(p)");
        let q = facts.add_artificial("(q)");
        let mut op = StripsOp::new("A".into());
        op.pre.insert(p);
        op.add_eff.insert(q);
        op.del_eff.insert(p);
        op.normalize();
        StripsTask {
            facts,
            ops: vec![op],
            init: [p].into_iter().collect(),
            goal: [q].into_iter().collect(),
            ..StripsTask::default()
        }
    }

    #[test]
    fn single_action_yields_one_cut() {
        let task = single_action_task();
        let (h, cuts) = lm_cut(&task, &task.init);
        assert_eq!(h, Some(1));
        assert_eq!(cuts, vec![[0].into_iter().collect()]);

        let g = create_lm_cut_landmarks(&task);
        assert_eq!(g.len(), 1);
        assert_eq!(g.nodes[0].connective, LmConnective::Disjunctive);
        assert_eq!(g.nodes[0].atoms, vec![LmAtom::action(0)]);
        assert_eq!(g.nodes[0].atoms[0].kind, LmAtomKind::Action);
    }

    #[test]
    fn satisfied_goal_has_no_cuts() {
        let task = single_action_task();
        let state: BTreeSet<FactId> = task.goal.clone();
        let (h, cuts) = lm_cut(&task, &state);
        assert_eq!(h, Some(0));
        assert!(cuts.is_empty());
    }

    #[test]
    fn unreachable_goal_reports_none() {
        let mut task = single_action_task();
        let blocked = task.facts.add_artificial("(blocked)");
        task.goal.insert(blocked);
        let (h, _) = lm_cut(&task, &task.init);
        assert_eq!(h, None);
    }
}
