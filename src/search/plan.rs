use crate::strips::StripsTask;
use std::fmt::{self, Display, Formatter};

/// A sequence of ground operator indices from the initial state to a goal
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    pub ops: Vec<usize>,
    pub cost: i64,
}

impl Plan {
    pub fn new(ops: Vec<usize>, task: &StripsTask) -> Self {
        let cost = ops.iter().map(|&o| task.ops[o].cost as i64).sum();
        Self { ops, cost }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn names<'a>(&self, task: &'a StripsTask) -> Vec<&'a str> {
        self.ops.iter().map(|&o| task.ops[o].name.as_str()).collect()
    }

    /// Replays the plan from the initial state; true iff every operator is
    /// applicable in turn and the final state satisfies the goal.
    pub fn validate(&self, task: &StripsTask) -> bool {
        let mut state = task.init.clone();
        for &op_id in &self.ops {
            let op = &task.ops[op_id];
            if !op.pre.is_subset(&state) {
                return false;
            }
            for ce in &op.cond_eff {
                if ce.pre.is_subset(&state) {
                    state = &state - &ce.del_eff;
                    state.extend(ce.add_eff.iter().copied());
                }
            }
            state = &state - &op.del_eff;
            state.extend(op.add_eff.iter().copied());
        }
        task.goal.is_subset(&state)
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "plan of length {} (cost {})", self.ops.len(), self.cost)
    }
}
