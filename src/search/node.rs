use crate::landmarks::LmPayload;
use crate::strips::FactId;
use std::collections::BTreeSet;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchNodeStatus {
    /// New node, not yet opened.
    New,
    /// In the open list.
    Open,
    /// Expanded.
    Closed,
    /// Proved a dead end by a heuristic.
    DeadEnd,
}

#[derive(Debug, Clone)]
pub struct SearchNode {
    pub id: NodeId,
    pub state: BTreeSet<FactId>,
    pub status: SearchNodeStatus,
    pub parent: Option<NodeId>,
    /// Operator that led here.
    pub op: Option<usize>,
    /// Path length from the root.
    pub path_length: i64,
    /// Accumulated action costs from the root.
    pub action_costs: i64,
    pub h_ff: i64,
    pub h_lm: i64,
    pub reached_by_helpful: bool,
    pub lm_payload: Option<LmPayload>,
}

impl SearchNode {
    pub fn root(id: NodeId, state: BTreeSet<FactId>) -> Self {
        Self {
            id,
            state,
            status: SearchNodeStatus::New,
            parent: None,
            op: None,
            path_length: 0,
            action_costs: 0,
            h_ff: 0,
            h_lm: 0,
            reached_by_helpful: false,
            lm_payload: None,
        }
    }

    pub fn child(id: NodeId, state: BTreeSet<FactId>, parent: &SearchNode, op: usize, op_cost: i64) -> Self {
        Self {
            id,
            state,
            status: SearchNodeStatus::New,
            parent: Some(parent.id),
            op: Some(op),
            path_length: parent.path_length + 1,
            action_costs: parent.action_costs + op_cost,
            h_ff: 0,
            h_lm: 0,
            reached_by_helpful: false,
            lm_payload: None,
        }
    }
}
