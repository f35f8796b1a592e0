//! The typed first-order planning model: types, objects, predicates,
//! condition trees, actions, and the normaliser that prepares them for
//! grounding.

mod action;
mod condition;
mod name;
pub mod normalize;
mod object;
mod param;
mod predicate;
mod problem;
mod requirements;
mod types;

pub use action::Action;
pub use condition::{Cond, CondArg, CondArgs, CondAtom, EffAtom, FuncOp};
pub use name::Name;
pub use normalize::InitIndex;
pub use object::{ObjId, Object, Objects};
pub use param::{find_param, Param, Params};
pub use predicate::{PredId, Predicate, Predicates};
pub use problem::{Pddl, PddlConfig};
pub use requirements::Requirements;
pub use types::{Type, TypeId, Types, OBJECT_TYPE};
