#![warn(missing_debug_implementations)]
#![deny(non_ascii_idents)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unit_bindings)]
#![warn(unused_crate_dependencies)]
#![warn(unused_qualifications)]

pub mod decomposition;
pub mod error;
pub mod ground;
pub mod landmarks;
pub mod lisp;
pub mod mutex;
pub mod pddl;
pub mod search;
pub mod strips;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
