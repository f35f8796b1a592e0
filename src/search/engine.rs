//! Greedy best-first search over the ground task driven by the LAMA
//! fringe: FF and landmark-count heuristics, preferred-operator boosting,
//! duplicate detection, and dead-end pruning.

use crate::landmarks::{LmContext, LmPayload};
use crate::search::{
    FfHeuristic, FfResult, LamaConfig, LamaFringe, LmCountHeuristic, NodeId, Plan, SearchNode,
    SearchNodeStatus, SearchStatistics,
};
use crate::strips::{FactId, StripsTask};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    Solved(Plan),
    ProvablyUnsolvable,
}

#[derive(Debug)]
pub struct SearchEngine {
    task: Rc<StripsTask>,
    cfg: LamaConfig,
    ff: Option<FfHeuristic>,
    lm: Option<LmCountHeuristic>,
}

impl SearchEngine {
    pub fn new(task: Rc<StripsTask>, cfg: LamaConfig, lm: Option<LmCountHeuristic>) -> Self {
        let ff = cfg.use_ff.then(|| FfHeuristic::new(task.clone()));
        Self { task, cfg, ff, lm }
    }

    pub fn search(&mut self) -> (SearchResult, SearchStatistics) {
        let task = self.task.clone();
        let mut statistics = SearchStatistics::new();

        let mut nodes: Vec<SearchNode> = Vec::new();
        let mut by_state: HashMap<BTreeSet<FactId>, NodeId> = HashMap::new();
        let mut fringe = LamaFringe::new(self.cfg);

        // The root always enters the fringe; if a heuristic already proves
        // it a dead end it is popped once, checked against the goal, and
        // closed without expansion.
        let mut root = SearchNode::root(0, task.init.clone());
        let root_ff = self.evaluate_ff(&mut root, &mut statistics);
        if root_ff.is_none() || !self.evaluate_lm_root(&mut root) {
            root.status = SearchNodeStatus::DeadEnd;
            statistics.increment_dead_end_nodes();
        } else {
            root.status = SearchNodeStatus::Open;
        }
        info!(h_ff = root.h_ff, h_lm = root.h_lm, "initial heuristic values");
        fringe.push(&root);
        by_state.insert(root.state.clone(), 0);
        nodes.push(root);

        while let Some(node_id) = fringe.pop() {
            if nodes[node_id].status == SearchNodeStatus::Closed {
                continue;
            }
            let was_dead_end = nodes[node_id].status == SearchNodeStatus::DeadEnd;
            nodes[node_id].status = SearchNodeStatus::Closed;
            statistics.increment_expanded_nodes();

            if task.goal.is_subset(&nodes[node_id].state) {
                let plan = extract_plan(&nodes, node_id, &task);
                statistics.log();
                return (SearchResult::Solved(plan), statistics);
            }
            if was_dead_end {
                continue;
            }

            let parent_ff = self
                .ff
                .as_ref()
                .map(|ff| ff.evaluate(&nodes[node_id].state));
            let helpful: BTreeSet<usize> = parent_ff
                .as_ref()
                .map(|r| r.helpful.clone())
                .unwrap_or_default();

            let applicable: Vec<usize> = (0..task.ops.len())
                .filter(|&o| task.ops[o].pre.is_subset(&nodes[node_id].state))
                .collect();
            statistics.increment_generated_nodes(applicable.len());

            for op_id in applicable {
                let successor = apply_op(&task, &nodes[node_id].state, op_id);
                match by_state.get(&successor) {
                    Some(&existing) => {
                        let better = nodes[node_id].path_length + 1 < nodes[existing].path_length;
                        if better && nodes[existing].status != SearchNodeStatus::DeadEnd {
                            statistics.increment_reopened_nodes();
                            let parent = nodes[node_id].clone();
                            let cost = task.ops[op_id].cost as i64;
                            let reopened = &mut nodes[existing];
                            reopened.parent = Some(parent.id);
                            reopened.op = Some(op_id);
                            reopened.path_length = parent.path_length + 1;
                            reopened.action_costs = parent.action_costs + cost;
                            reopened.reached_by_helpful = helpful.contains(&op_id);
                            reopened.status = SearchNodeStatus::Open;
                            if !self.refresh_lm(&parent, existing, &mut nodes, op_id) {
                                nodes[existing].status = SearchNodeStatus::DeadEnd;
                                statistics.increment_dead_end_nodes();
                                continue;
                            }
                            fringe.push(&nodes[existing]);
                        }
                    }
                    None => {
                        let id = nodes.len();
                        let cost = task.ops[op_id].cost as i64;
                        let mut child =
                            SearchNode::child(id, successor, &nodes[node_id], op_id, cost);
                        child.reached_by_helpful = helpful.contains(&op_id);

                        let child_ff = self.evaluate_ff(&mut child, &mut statistics);
                        let live = child_ff.is_some()
                            && self.progress_lm(&nodes[node_id], &mut child, op_id);
                        if !live {
                            child.status = SearchNodeStatus::DeadEnd;
                            statistics.increment_dead_end_nodes();
                            by_state.insert(child.state.clone(), id);
                            nodes.push(child);
                            continue;
                        }
                        child.status = SearchNodeStatus::Open;
                        fringe.push(&child);
                        by_state.insert(child.state.clone(), id);
                        nodes.push(child);
                    }
                }
            }
        }

        statistics.log();
        (SearchResult::ProvablyUnsolvable, statistics)
    }

    /// Evaluates FF for the node; `None` marks a relaxed dead end.
    fn evaluate_ff(
        &self,
        node: &mut SearchNode,
        statistics: &mut SearchStatistics,
    ) -> Option<FfResult> {
        let Some(ff) = &self.ff else {
            return Some(FfResult {
                h: Some(0),
                relaxed_plan: BTreeSet::new(),
                helpful: BTreeSet::new(),
            });
        };
        statistics.increment_evaluated_nodes();
        let result = ff.evaluate(&node.state);
        node.h_ff = result.h?;
        Some(result)
    }

    fn evaluate_lm_root(&self, root: &mut SearchNode) -> bool {
        let Some(lm) = &self.lm else { return true };
        let ctx = LmContext::state_only(&root.state);
        let (payload, value) = lm.initial(&ctx);
        let Some(value) = value else { return false };
        root.h_lm = value;
        root.lm_payload = Some(payload);
        true
    }

    fn progress_lm(&self, parent: &SearchNode, child: &mut SearchNode, op_id: usize) -> bool {
        let Some(lm) = &self.lm else { return true };
        let parent_payload = parent
            .lm_payload
            .clone()
            .unwrap_or_else(|| LmPayload {
                fulfilled: fixedbitset::FixedBitSet::with_capacity(lm.graph.len()),
            });
        let ctx = LmContext {
            state: &child.state,
            contained_tasks: &[],
            applied_action: Some(op_id),
            applied_method: None,
        };
        let (payload, value) = lm.progress(&parent_payload, &ctx);
        let Some(value) = value else { return false };
        child.h_lm = value;
        child.lm_payload = Some(payload);
        true
    }

    fn refresh_lm(
        &self,
        parent: &SearchNode,
        existing: NodeId,
        nodes: &mut [SearchNode],
        op_id: usize,
    ) -> bool {
        let mut child = nodes[existing].clone();
        let live = self.progress_lm(parent, &mut child, op_id);
        nodes[existing] = child;
        live
    }
}

fn apply_op(task: &StripsTask, state: &BTreeSet<FactId>, op_id: usize) -> BTreeSet<FactId> {
    let op = &task.ops[op_id];
    let mut next = state.clone();
    for ce in &op.cond_eff {
        if ce.pre.is_subset(state) {
            next = &next - &ce.del_eff;
            next.extend(ce.add_eff.iter().copied());
        }
    }
    next = &next - &op.del_eff;
    next.extend(op.add_eff.iter().copied());
    next
}

fn extract_plan(nodes: &[SearchNode], goal: NodeId, task: &StripsTask) -> Plan {
    let mut ops = Vec::new();
    let mut cur = goal;
    while let Some(op) = nodes[cur].op {
        ops.push(op);
        cur = nodes[cur].parent.expect("node with an operator has a parent");
    }
    ops.reverse();
    Plan::new(ops, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{build_landmark_graph, LmAtom, LmGraph, LmNode, LmProviderKind};
    use crate::mutex::{h2, H2Limits, MutexPairs};
    use crate::strips::{Facts, StripsOp};
    use crate::test_utils::*;

    #[test]
    fn travel_pipeline_solves_with_lm_count_alone() {
        let task = Rc::new(ground_fixture(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT));
        let graph = build_landmark_graph(LmProviderKind::LmCut, &task, None).unwrap();
        let lm = LmCountHeuristic::new(graph, &task, None, true);
        let cfg = LamaConfig {
            use_ff: false,
            use_ff_preferred: false,
            ..LamaConfig::default()
        };
        let mut engine = SearchEngine::new(task.clone(), cfg, Some(lm));
        let (result, _) = engine.search();
        match result {
            SearchResult::Solved(plan) => {
                assert_eq!(plan.len(), 1);
                assert_eq!(plan.names(&task), vec!["move a c"]);
                assert!(plan.validate(&task));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn beacon_pipeline_is_unsolvable_end_to_end() {
        let task = ground_fixture(BEACON_DOMAIN_TEXT, BEACON_PROBLEM01_TEXT);

        // h2 witnesses the goal fact as unreachable
        let mut mutex = MutexPairs::new(task.facts.len());
        let mut unreachable = std::collections::BTreeSet::new();
        h2(&task, &mut mutex, Some(&mut unreachable), None, &H2Limits::default()).unwrap();
        let lit_b = task.fact_by_name("(lit b)").unwrap();
        assert!(mutex.is_mutex(lit_b, lit_b));
        assert!(unreachable.contains(&lit_b));

        let mut engine = SearchEngine::new(Rc::new(task), LamaConfig::default(), None);
        let (result, statistics) = engine.search();
        assert_eq!(result, SearchResult::ProvablyUnsolvable);
        // the initial node is popped once before the search halts
        assert_eq!(statistics.expanded_nodes(), 1);
        assert_eq!(statistics.dead_end_nodes(), 1);
    }

    #[test]
    fn workshop_pipeline_finds_a_costed_plan() {
        let task = Rc::new(ground_fixture(WORKSHOP_DOMAIN_TEXT, WORKSHOP_PROBLEM01_TEXT));
        let mut engine = SearchEngine::new(task.clone(), LamaConfig::default(), None);
        let (result, _) = engine.search();
        match result {
            SearchResult::Solved(plan) => {
                // grab, polish, drop
                assert_eq!(
                    plan.names(&task),
                    vec!["grab rag", "polish-all rag", "drop rag"]
                );
                assert_eq!(plan.cost, 4);
                assert!(plan.validate(&task));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    /// Objects a, b, c with `move` operators between all pairs; start a,
    /// goal c.
    fn move_task() -> StripsTask {
        let mut facts = Facts::default();
        let names = ["(at a)", "(at b)", "(at c)"];
        for name in names {
            facts.add_artificial(name);
        }
        let mut ops = Vec::new();
        for from in 0..3usize {
            for to in 0..3usize {
                if from == to {
                    continue;
                }
                let mut op = StripsOp::new(format!("move {} {}", from, to));
                op.pre.insert(from);
                op.add_eff.insert(to);
                op.del_eff.insert(from);
                op.normalize();
                ops.push(op);
            }
        }
        StripsTask {
            facts,
            ops,
            init: [0].into_iter().collect(),
            goal: [2].into_iter().collect(),
            ..StripsTask::default()
        }
    }

    #[test]
    fn finds_the_single_step_plan() {
        let task = Rc::new(move_task());
        let mut engine = SearchEngine::new(task.clone(), LamaConfig::default(), None);
        let (result, _) = engine.search();
        match result {
            SearchResult::Solved(plan) => {
                assert_eq!(plan.len(), 1);
                assert_eq!(plan.names(&task), vec!["move 0 2"]);
                assert!(plan.validate(&task));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lm_count_alone_finds_the_plan() {
        let task = Rc::new(move_task());
        let graph = LmGraph::new(vec![LmNode::conjunctive(vec![LmAtom::fact(2)])]);
        let lm = LmCountHeuristic::new(graph, &task, None, true);
        let cfg = LamaConfig {
            use_ff: false,
            use_ff_preferred: false,
            ..LamaConfig::default()
        };
        let mut engine = SearchEngine::new(task.clone(), cfg, Some(lm));
        let (result, _) = engine.search();
        match result {
            SearchResult::Solved(plan) => {
                assert_eq!(plan.len(), 1);
                assert!(plan.validate(&task));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unreachable_goal_halts_after_the_initial_node() {
        let mut task = move_task();
        let unreachable = task.facts.add_artificial("(at d)");
        task.goal.insert(unreachable);
        let task = Rc::new(task);
        let mut engine = SearchEngine::new(task, LamaConfig::default(), None);
        let (result, statistics) = engine.search();
        assert_eq!(result, SearchResult::ProvablyUnsolvable);
        // the relaxed dead end is popped once and closed without expansion
        assert_eq!(statistics.expanded_nodes(), 1);
    }

    #[test]
    fn satisfied_goal_yields_the_empty_plan() {
        let mut task = move_task();
        task.goal = task.init.clone();
        let task = Rc::new(task);
        let mut engine = SearchEngine::new(task, LamaConfig::default(), None);
        let (result, _) = engine.search();
        assert_eq!(result, SearchResult::Solved(Plan::default()));
    }
}
