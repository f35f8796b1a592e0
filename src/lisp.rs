//! The S-expression AST consumed by the model builder. The tokeniser that
//! produces these nodes lives in the parser collaborator; this module only
//! defines the node shape and the keyword vocabulary.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use strum_macros::{Display as StrumDisplay, EnumString};

/// Keywords recognised while walking a domain or problem AST. Tokens that
/// match none of these keep a bare `value` and no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString)]
pub enum Keyword {
    #[strum(serialize = "define")]
    Define,
    #[strum(serialize = "domain")]
    Domain,
    #[strum(serialize = ":domain")]
    DomainRef,
    #[strum(serialize = "problem")]
    Problem,
    #[strum(serialize = ":requirements")]
    Requirements,
    #[strum(serialize = ":types")]
    Types,
    #[strum(serialize = ":constants")]
    Constants,
    #[strum(serialize = ":predicates")]
    Predicates,
    #[strum(serialize = ":functions")]
    Functions,
    #[strum(serialize = ":action")]
    Action,
    #[strum(serialize = ":parameters")]
    Parameters,
    #[strum(serialize = ":precondition")]
    Precondition,
    #[strum(serialize = ":effect")]
    Effect,
    #[strum(serialize = ":objects")]
    Objects,
    #[strum(serialize = ":init")]
    Init,
    #[strum(serialize = ":goal")]
    Goal,
    #[strum(serialize = ":metric")]
    Metric,
    #[strum(serialize = ":private")]
    Private,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "imply")]
    Imply,
    #[strum(serialize = "exists")]
    Exists,
    #[strum(serialize = "forall")]
    Forall,
    #[strum(serialize = "when")]
    When,
    #[strum(serialize = "either")]
    Either,
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "increase")]
    Increase,
    #[strum(serialize = "minimize")]
    Minimize,
}

/// One node of the S-expression tree. A token node has a `value` (lowercased
/// by the tokeniser; PDDL is case-insensitive) and possibly a keyword tag;
/// a list node has `children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub value: Option<String>,
    pub kw: Option<Keyword>,
    pub line: u32,
    pub children: Vec<Node>,
}

impl Node {
    pub fn token(value: impl Into<String>, line: u32) -> Self {
        let value = value.into().to_lowercase();
        let kw = Keyword::from_str(&value).ok();
        Self {
            value: Some(value),
            kw,
            line,
            children: Vec::new(),
        }
    }

    pub fn list(children: Vec<Node>, line: u32) -> Self {
        Self {
            value: None,
            kw: None,
            line,
            children,
        }
    }

    pub fn is_token(&self) -> bool {
        self.value.is_some()
    }

    /// The token text, if this node is a token.
    pub fn token_value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The keyword tag of this node's head token, for list nodes.
    pub fn head_kw(&self) -> Option<Keyword> {
        self.children.first().and_then(|c| c.kw)
    }

    /// Finds the immediate child list whose head carries the given keyword.
    pub fn child_with_head(&self, kw: Keyword) -> Option<&Node> {
        self.children
            .iter()
            .find(|c| !c.is_token() && c.head_kw() == Some(kw))
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(value) = &self.value {
            write!(f, "{}", value)
        } else {
            write!(f, "(")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_tagged_with_keywords() {
        assert_eq!(Node::token(":action", 3).kw, Some(Keyword::Action));
        assert_eq!(Node::token("FORALL", 1).kw, Some(Keyword::Forall));
        assert_eq!(Node::token("truck", 2).kw, None);
    }

    #[test]
    fn head_keyword_of_list() {
        let node = Node::list(
            vec![Node::token("and", 1), Node::token("p", 1)],
            1,
        );
        assert_eq!(node.head_kw(), Some(Keyword::And));
        assert!(!node.is_token());
    }

    #[test]
    fn display_roundtrip_shape() {
        let node = Node::list(
            vec![
                Node::token("at", 4),
                Node::token("truck1", 4),
                Node::token("depot", 4),
            ],
            4,
        );
        assert_eq!(node.to_string(), "(at truck1 depot)");
    }
}
