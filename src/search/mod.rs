//! Best-first search over the ground task with the LAMA-style alternating
//! fringe.

mod engine;
mod ff;
mod fringe;
mod lm_count;
mod node;
mod plan;
mod statistics;

pub use engine::{SearchEngine, SearchResult};
pub use ff::{FfHeuristic, FfResult};
pub use fringe::{GVariant, LamaConfig, LamaFringe, QueueConfig};
pub use lm_count::LmCountHeuristic;
pub use node::{NodeId, SearchNode, SearchNodeStatus};
pub use plan::Plan;
pub use statistics::SearchStatistics;
