//! Mutex analysis over the ground task: the pair-mutex table, the h²
//! fixed points, disambiguation, and lifted mutex-group inference plus
//! grounding.

mod disambiguate;
mod h2;
mod infer;
mod lifted_mgroup;
mod mgroup;
mod pair;

pub use disambiguate::{Disambiguate, DisambiguateResult};
pub use h2::{h2, h2_fw_bw, H2Limits};
pub use infer::{infer_fam_groups, infer_monotonicity, InferLimits};
pub use lifted_mgroup::{LiftedMGroup, LiftedMGroups};
pub use mgroup::{MGroup, MGroups};
pub use pair::MutexPairs;
