//! The landmark-count heuristic: unfulfilled landmarks count once, plus
//! "required again" contributions for goal landmarks and unfulfilled
//! greedy-necessary successors. A landmark that can no longer be reached
//! makes the node a dead end.

use crate::decomposition::Decomposition;
use crate::landmarks::{LmAtomKind, LmContext, LmGraph, LmPayload};
use crate::strips::StripsTask;
use fixedbitset::FixedBitSet;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug)]
pub struct LmCountHeuristic {
    pub graph: LmGraph,
    add_to_ops: Vec<Vec<usize>>,
    del_to_ops: Vec<Vec<usize>>,
    decomp: Option<Rc<Decomposition>>,
    check_reachability: bool,
}

impl LmCountHeuristic {
    pub fn new(
        graph: LmGraph,
        task: &StripsTask,
        decomp: Option<Rc<Decomposition>>,
        check_reachability: bool,
    ) -> Self {
        let mut add_to_ops = vec![Vec::new(); task.facts.len()];
        let mut del_to_ops = vec![Vec::new(); task.facts.len()];
        for (op_id, op) in task.ops.iter().enumerate() {
            for &f in &op.add_eff {
                add_to_ops[f].push(op_id);
            }
            for &f in &op.del_eff {
                del_to_ops[f].push(op_id);
            }
        }
        Self {
            graph,
            add_to_ops,
            del_to_ops,
            decomp,
            check_reachability,
        }
    }

    pub fn initial(&self, ctx: &LmContext<'_>) -> (LmPayload, Option<i64>) {
        let payload = self.graph.initial_payload(ctx);
        let value = self.value_of(&payload, ctx);
        (payload, value)
    }

    pub fn progress(
        &self,
        parent: &LmPayload,
        ctx: &LmContext<'_>,
    ) -> (LmPayload, Option<i64>) {
        let payload = self.graph.progress(parent, ctx);
        let value = self.value_of(&payload, ctx);
        (payload, value)
    }

    /// `None` signals a dead end (some landmark became unreachable).
    fn value_of(&self, payload: &LmPayload, ctx: &LmContext<'_>) -> Option<i64> {
        if self.check_reachability && !self.all_landmarks_reachable(payload, ctx) {
            debug!("landmark became unreachable; dead end");
            return None;
        }

        let mut h = 0;
        for i in 0..self.graph.len() {
            if !payload.fulfilled.contains(i) {
                h += 1;
            } else if self.graph.nodes[i].is_true_in_goal {
                // required again because it must hold in the goal
                h += 1;
            } else if self.graph.greedy_necessary.succs[i]
                .iter()
                .any(|&succ| !payload.fulfilled.contains(succ))
            {
                // required again right before the successor's first
                // achievement
                h += 1;
            }
        }
        Some(h)
    }

    fn reachable_tasks(&self, ctx: &LmContext<'_>) -> Option<FixedBitSet> {
        self.decomp
            .as_ref()
            .map(|d| d.reachable_from(ctx.contained_tasks))
    }

    fn all_landmarks_reachable(&self, payload: &LmPayload, ctx: &LmContext<'_>) -> bool {
        let reachable_tasks = self.reachable_tasks(ctx);
        let task_reachable = |id: usize| {
            reachable_tasks
                .as_ref()
                .map(|r| r.contains(id))
                .unwrap_or(true)
        };

        for i in 0..self.graph.len() {
            if payload.fulfilled.contains(i) {
                continue;
            }
            let node = &self.graph.nodes[i];
            let mut any = false;
            let mut all = true;
            for atom in &node.atoms {
                let ok = match atom.kind {
                    LmAtomKind::Task | LmAtomKind::Action => task_reachable(atom.id),
                    LmAtomKind::Method => {
                        let task = self
                            .decomp
                            .as_ref()
                            .map(|d| d.method(atom.id).task);
                        task.map(task_reachable).unwrap_or(true)
                    }
                    LmAtomKind::Fact => {
                        if ctx.state.contains(&atom.id) != atom.negated {
                            true
                        } else if !atom.negated {
                            self.add_to_ops[atom.id].iter().any(|&o| task_reachable(o))
                        } else {
                            self.del_to_ops[atom.id].iter().any(|&o| task_reachable(o))
                        }
                    }
                };
                any |= ok;
                all &= ok;
            }
            let fulfillable = match node.connective {
                crate::landmarks::LmConnective::Disjunctive => any,
                crate::landmarks::LmConnective::Conjunctive => all,
            };
            if !fulfillable {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LmAtom, LmNode, LmOrderingKind};
    use crate::strips::{Facts, StripsOp};
    use std::collections::BTreeSet;

    fn task_with_one_op() -> StripsTask {
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
    fn action_landmark_counts_until_applied() {
        let task = task_with_one_op();
        let graph = LmGraph::new(vec![LmNode::disjunctive(vec![LmAtom::action(0)])]);
        let h = LmCountHeuristic::new(graph, &task, None, true);

        let ctx = LmContext::state_only(&task.init);
        let (payload, value) = h.initial(&ctx);
        assert_eq!(value, Some(1));

        // applying A fulfils the landmark
        let state: BTreeSet<usize> = [1].into_iter().collect();
        let ctx = LmContext {
            state: &state,
            contained_tasks: &[],
            applied_action: Some(0),
            applied_method: None,
        };
        let (_, value) = h.progress(&payload, &ctx);
        assert_eq!(value, Some(0));
    }

    #[test]
    fn goal_landmark_is_required_again() {
        let task = task_with_one_op();
        let mut graph = LmGraph::new(vec![LmNode::conjunctive(vec![LmAtom::fact(1)])]);
        graph.mark_true_in_goal(&task.goal);
        let h = LmCountHeuristic::new(graph, &task, None, false);

        let state: BTreeSet<usize> = [1].into_iter().collect();
        let ctx = LmContext::state_only(&state);
        let (_, value) = h.initial(&ctx);
        // fulfilled, but counted again since it must hold in the goal
        assert_eq!(value, Some(1));
    }

    #[test]
    fn unfulfilled_greedy_necessary_successor_requires_the_parent_again() {
        let task = task_with_one_op();
        let mut graph = LmGraph::new(vec![
            LmNode::conjunctive(vec![LmAtom::fact(0)]),
            LmNode::conjunctive(vec![LmAtom::fact(1)]),
        ]);
        graph.add_ordering(0, 1, LmOrderingKind::GreedyNecessary);
        let h = LmCountHeuristic::new(graph, &task, None, false);

        let ctx = LmContext::state_only(&task.init);
        let (_, value) = h.initial(&ctx);
        // node 0 fulfilled but required again (successor open), node 1 open
        assert_eq!(value, Some(2));
    }

    #[test]
    fn unreachable_fact_landmark_is_a_dead_end() {
        let mut task = task_with_one_op();
        let dangling = task.facts.add_artificial("(dangling)");
        let graph = LmGraph::new(vec![LmNode::conjunctive(vec![LmAtom::fact(dangling)])]);
        let h = LmCountHeuristic::new(graph, &task, None, true);
        let ctx = LmContext::state_only(&task.init);
        let (_, value) = h.initial(&ctx);
        assert_eq!(value, None);
    }
}
