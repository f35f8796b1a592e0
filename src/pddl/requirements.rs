//! Requirement flags declared in a domain's `(:requirements ...)` section.

use crate::error::{Error, Result};
use crate::lisp::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements(u32);

impl Requirements {
    pub const STRIPS: Requirements = Requirements(0x1);
    pub const TYPING: Requirements = Requirements(0x2);
    pub const NEGATIVE_PRE: Requirements = Requirements(0x4);
    pub const DISJUNCTIVE_PRE: Requirements = Requirements(0x8);
    pub const EQUALITY: Requirements = Requirements(0x10);
    pub const EXISTENTIAL_PRE: Requirements = Requirements(0x20);
    pub const UNIVERSAL_PRE: Requirements = Requirements(0x40);
    pub const CONDITIONAL_EFF: Requirements = Requirements(0x80);
    pub const NUMERIC_FLUENTS: Requirements = Requirements(0x100);
    pub const OBJECT_FLUENTS: Requirements = Requirements(0x200);
    pub const ACTION_COSTS: Requirements = Requirements(0x400);

    /// The union `:adl` abbreviates.
    pub fn adl() -> Requirements {
        Self::STRIPS
            | Self::TYPING
            | Self::NEGATIVE_PRE
            | Self::DISJUNCTIVE_PRE
            | Self::EQUALITY
            | Self::EXISTENTIAL_PRE
            | Self::UNIVERSAL_PRE
            | Self::CONDITIONAL_EFF
    }

    /// Everything; used by `force_adl` to silence requirement checks.
    pub fn all() -> Requirements {
        Requirements(0x7ff)
    }

    pub fn contains(&self, other: Requirements) -> bool {
        self.0 & other.0 == other.0
    }

    fn from_flag(flag: &str) -> Option<Requirements> {
        Some(match flag {
            ":strips" => Self::STRIPS,
            ":typing" => Self::TYPING,
            ":negative-preconditions" => Self::NEGATIVE_PRE,
            ":disjunctive-preconditions" => Self::DISJUNCTIVE_PRE,
            ":equality" => Self::EQUALITY,
            ":existential-preconditions" => Self::EXISTENTIAL_PRE,
            ":universal-preconditions" => Self::UNIVERSAL_PRE,
            ":quantified-preconditions" => Self::EXISTENTIAL_PRE | Self::UNIVERSAL_PRE,
            ":conditional-effects" => Self::CONDITIONAL_EFF,
            ":numeric-fluents" => Self::NUMERIC_FLUENTS,
            ":object-fluents" => Self::OBJECT_FLUENTS,
            ":fluents" => Self::NUMERIC_FLUENTS | Self::OBJECT_FLUENTS,
            ":action-costs" => Self::ACTION_COSTS,
            ":adl" => Self::adl(),
            _ => return None,
        })
    }

    /// Parses a `(:requirements ...)` list node.
    pub fn parse(node: &Node) -> Result<Requirements> {
        let mut req = Requirements::default();
        for flag in node.children.iter().skip(1) {
            let text = flag.token_value().ok_or_else(|| {
                Error::structural(flag.line, "expected a requirement flag, found a list")
            })?;
            match Self::from_flag(text) {
                Some(r) => req = req | r,
                None => {
                    return Err(Error::structural(
                        flag.line,
                        format!("unknown requirement flag {}", text),
                    ))
                }
            }
        }
        Ok(req)
    }
}

impl std::ops::BitOr for Requirements {
    type Output = Requirements;

    fn bitor(self, rhs: Requirements) -> Requirements {
        Requirements(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adl_expands_to_union() {
        let adl = Requirements::adl();
        assert!(adl.contains(Requirements::STRIPS));
        assert!(adl.contains(Requirements::CONDITIONAL_EFF));
        assert!(!adl.contains(Requirements::ACTION_COSTS));
    }

    #[test]
    fn parse_requirement_list() {
        let node = Node::list(
            vec![
                Node::token(":requirements", 1),
                Node::token(":strips", 1),
                Node::token(":typing", 1),
                Node::token(":action-costs", 1),
            ],
            1,
        );
        let req = Requirements::parse(&node).unwrap();
        assert!(req.contains(Requirements::STRIPS | Requirements::TYPING));
        assert!(req.contains(Requirements::ACTION_COSTS));
        assert!(!req.contains(Requirements::EQUALITY));
    }

    #[test]
    fn unknown_flag_is_structural_error() {
        let node = Node::list(
            vec![Node::token(":requirements", 7), Node::token(":htn", 7)],
            7,
        );
        assert_eq!(
            Requirements::parse(&node),
            Err(Error::structural(7, "unknown requirement flag :htn"))
        );
    }
}
