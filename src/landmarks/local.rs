//! Local landmarks: for every task reachable from the initial network, the
//! subtasks shared by all of its methods are landmarks, applied
//! recursively.

use crate::decomposition::{Decomposition, TaskId};
use crate::landmarks::{LmAtom, LmGraph, LmNode};
use std::collections::BTreeSet;
use tracing::info;

/// Subtasks common to every method of `task`; primitive tasks have none.
fn local_landmarks_of(decomp: &Decomposition, task: TaskId) -> BTreeSet<TaskId> {
    let mut out: BTreeSet<TaskId> = BTreeSet::new();
    for (i, &m) in decomp.methods_of(task).iter().enumerate() {
        let subtasks: BTreeSet<TaskId> =
            decomp.method(m).subtasks.iter().copied().collect();
        if i == 0 {
            out = subtasks;
        } else {
            out = out.intersection(&subtasks).copied().collect();
        }
    }
    out
}

/// Builds the landmark graph of Elkawkagy-style local landmarks over the
/// initial task network.
pub fn create_local_landmarks(decomp: &Decomposition) -> LmGraph {
    let initial: BTreeSet<TaskId> = decomp.initial_network().iter().copied().collect();

    let mut landmarks: BTreeSet<TaskId> = BTreeSet::new();
    let mut collect: BTreeSet<TaskId> = BTreeSet::new();
    for &task in &initial {
        for lm in local_landmarks_of(decomp, task) {
            collect.insert(lm);
            landmarks.insert(lm);
        }
    }
    while !collect.is_empty() {
        let last_round = std::mem::take(&mut collect);
        for task in last_round {
            for lm in local_landmarks_of(decomp, task) {
                if landmarks.insert(lm) {
                    collect.insert(lm);
                }
            }
        }
    }

    let nodes = landmarks
        .into_iter()
        .map(|lm| LmNode::conjunctive(vec![LmAtom::task(lm)]))
        .collect::<Vec<_>>();
    info!(landmarks = nodes.len(), "extracted local landmarks");
    LmGraph::new(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LmAtomKind;

    /// deliver decomposes via two methods that both contain fetch; fetch
    /// decomposes via a single method into operator 0.
    fn fixture() -> Decomposition {
        let mut d = Decomposition::new(2);
        let deliver = d.add_abstract("deliver");
        let fetch = d.add_abstract("fetch");
        d.add_method("by-truck", deliver, vec![fetch, 0]);
        d.add_method("by-drone", deliver, vec![fetch, 1]);
        d.add_method("m-fetch", fetch, vec![0]);
        d.set_initial_network(vec![deliver]);
        d
    }

    #[test]
    fn shared_subtasks_become_landmarks() {
        let d = fixture();
        let g = create_local_landmarks(&d);

        let ids: Vec<usize> = g.nodes.iter().map(|n| n.atoms[0].id).collect();
        // fetch is in every method of deliver; operator 0 is fetch's only
        // decomposition
        assert_eq!(ids, vec![0, 3]);
        assert!(g
            .nodes
            .iter()
            .all(|n| n.atoms.len() == 1 && n.atoms[0].kind == LmAtomKind::Task));
        assert!(g.check_consistency());
    }
}
