//! Grounding: preprocessed actions, expansion trees and the fixed-point
//! reachability loop turning the first-order model into a STRIPS task.

mod atom;
mod grounder;
mod prep_action;
mod tree;

pub use atom::{ArgTuple, GroundAtom, GroundAtomId, GroundAtoms, RawArgs, TYPICAL_NUM_ARGS};
pub use grounder::{ground, ground_with_observer, GroundConfig};
pub use prep_action::{PrepAction, PrepActions};
pub use tree::GroundTree;
