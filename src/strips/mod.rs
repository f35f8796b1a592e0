//! Propositional (STRIPS) entities: facts, ground operators and the
//! assembled task.

mod fact;
mod op;
mod task;

pub use fact::{Fact, FactId, Facts};
pub use op::{CondEff, StripsOp};
pub use task::StripsTask;
