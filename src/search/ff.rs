//! Delete-relaxation heuristic over the ground task: an additive-cost
//! Dijkstra over facts, FF extraction of a relaxed plan, and helpful
//! operators (relaxed-plan operators applicable right now).

use crate::strips::{FactId, StripsTask};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct FfResult {
    /// `None` when the goal is unreachable in the relaxation.
    pub h: Option<i64>,
    pub relaxed_plan: BTreeSet<usize>,
    /// Relaxed-plan operators applicable in the evaluated state.
    pub helpful: BTreeSet<usize>,
}

#[derive(Debug)]
pub struct FfHeuristic {
    task: Rc<StripsTask>,
    /// Operators indexed by precondition fact.
    pre_to_ops: Vec<Vec<usize>>,
}

impl FfHeuristic {
    pub fn new(task: Rc<StripsTask>) -> Self {
        let mut pre_to_ops = vec![Vec::new(); task.facts.len()];
        for (op_id, op) in task.ops.iter().enumerate() {
            for &f in &op.pre {
                pre_to_ops[f].push(op_id);
            }
        }
        Self { task, pre_to_ops }
    }

    pub fn evaluate(&self, state: &BTreeSet<FactId>) -> FfResult {
        let task = &*self.task;
        let n = task.facts.len();
        let mut fact_cost: Vec<Option<i64>> = vec![None; n];
        let mut supporter: Vec<Option<usize>> = vec![None; n];
        let mut missing_pre: Vec<usize> = task.ops.iter().map(|o| o.pre.len()).collect();

        let mut queue: PriorityQueue<FactId, Reverse<i64>> = PriorityQueue::new();
        for &f in state {
            fact_cost[f] = Some(0);
            queue.push(f, Reverse(0));
        }

        let mut ready: Vec<usize> = (0..task.ops.len())
            .filter(|&o| task.ops[o].pre.is_empty())
            .collect();

        while !queue.is_empty() || !ready.is_empty() {
            for op_id in std::mem::take(&mut ready) {
                let op = &task.ops[op_id];
                let pre_cost: i64 = op
                    .pre
                    .iter()
                    .map(|&f| fact_cost[f].expect("satisfied precondition has a cost"))
                    .sum();
                let through = pre_cost + op.cost.max(0) as i64;
                for &a in &op.add_eff {
                    if fact_cost[a].map(|c| through < c).unwrap_or(true) {
                        fact_cost[a] = Some(through);
                        supporter[a] = Some(op_id);
                        queue.push(a, Reverse(through));
                    }
                }
            }
            let Some((fact, _)) = queue.pop() else { continue };
            for &op_id in &self.pre_to_ops[fact] {
                missing_pre[op_id] -= 1;
                if missing_pre[op_id] == 0 {
                    ready.push(op_id);
                }
            }
        }

        if task.goal.iter().any(|&g| fact_cost[g].is_none()) {
            return FfResult {
                h: None,
                relaxed_plan: BTreeSet::new(),
                helpful: BTreeSet::new(),
            };
        }

        // FF extraction: walk best supporters backwards from the goal.
        let mut relaxed_plan: BTreeSet<usize> = BTreeSet::new();
        let mut open: Vec<FactId> = task.goal.iter().copied().collect();
        let mut seen: BTreeSet<FactId> = open.iter().copied().collect();
        while let Some(f) = open.pop() {
            if state.contains(&f) {
                continue;
            }
            let Some(op_id) = supporter[f] else { continue };
            if relaxed_plan.insert(op_id) {
                for &p in &task.ops[op_id].pre {
                    if seen.insert(p) {
                        open.push(p);
                    }
                }
            }
        }

        let h = relaxed_plan
            .iter()
            .map(|&o| task.ops[o].cost.max(1) as i64)
            .sum();
        let helpful = relaxed_plan
            .iter()
            .copied()
            .filter(|&o| task.ops[o].pre.is_subset(state))
            .collect();

        FfResult {
            h: Some(h),
            relaxed_plan,
            helpful,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strips::{Facts, StripsOp};

    /// A two-step relaxed chain: p -> q -> r.
    fn chain_task() -> StripsTask {
        let mut facts = Facts::default();
        let p = facts.add_artificial("(p)");
        let q = facts.add_artificial("(q)");
        let r = facts.add_artificial("(r)");
        let mut step1 = StripsOp::new("step1".into());
        step1.pre.insert(p);
        step1.add_eff.insert(q);
        let mut step2 = StripsOp::new("step2".into());
        step2.pre.insert(q);
        step2.add_eff.insert(r);
        StripsTask {
            facts,
            ops: vec![step1, step2],
            init: [p].into_iter().collect(),
            goal: [r].into_iter().collect(),
            ..StripsTask::default()
        }
    }

    #[test]
    fn relaxed_plan_covers_the_chain() {
        let task = Rc::new(chain_task());
        let ff = FfHeuristic::new(task.clone());
        let result = ff.evaluate(&task.init);
        assert_eq!(result.h, Some(2));
        assert_eq!(result.relaxed_plan, [0, 1].into_iter().collect());
        // only step1 is applicable right now
        assert_eq!(result.helpful, [0].into_iter().collect());
    }

    #[test]
    fn satisfied_goal_costs_nothing() {
        let task = Rc::new(chain_task());
        let ff = FfHeuristic::new(task.clone());
        let state: BTreeSet<FactId> = [2].into_iter().collect();
        let result = ff.evaluate(&state);
        assert_eq!(result.h, Some(0));
        assert!(result.relaxed_plan.is_empty());
    }

    #[test]
    fn unreachable_goal_is_a_dead_end() {
        let mut task = chain_task();
        task.ops.remove(1);
        let ff = FfHeuristic::new(Rc::new(task));
        let state: BTreeSet<FactId> = [0].into_iter().collect();
        assert_eq!(ff.evaluate(&state).h, None);
    }
}
