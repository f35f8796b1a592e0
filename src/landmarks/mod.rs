//! Landmark graphs over facts, actions, abstract tasks and methods, with
//! typed orderings and pluggable providers.

mod graph;
mod lm_cut;
mod local;
mod provider;

pub use graph::{
    Adjacency, LmAtom, LmAtomKind, LmConnective, LmContext, LmGraph, LmNode, LmOrderingKind,
    LmPayload,
};
pub use lm_cut::{create_lm_cut_landmarks, lm_cut};
pub use local::create_local_landmarks;
pub use provider::{build_landmark_graph, LmProviderKind};
