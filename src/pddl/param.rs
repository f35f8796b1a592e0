use crate::pddl::{Name, TypeId};

/// One parameter of an action, quantifier or lifted mutex group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Name,
    pub type_: TypeId,
    pub is_agent: bool,
    /// For a variable introduced by a quantifier: the index of the
    /// enclosing declared parameter scope it was appended behind.
    pub inherit: Option<usize>,
    /// Counted variables are existentially bound per grounding of a lifted
    /// mutex group.
    pub is_counted_var: bool,
}

impl Param {
    pub fn new(name: Name, type_: TypeId) -> Self {
        Self {
            name,
            type_,
            is_agent: false,
            inherit: None,
            is_counted_var: false,
        }
    }

    pub fn counted(type_: TypeId) -> Self {
        Self {
            name: Name::new("?_c"),
            type_,
            is_agent: false,
            inherit: None,
            is_counted_var: true,
        }
    }
}

pub type Params = Vec<Param>;

/// Position of `name` in a parameter list, searching the innermost scope
/// first so quantifier variables shadow action parameters.
pub fn find_param(params: &Params, name: &str) -> Option<usize> {
    params.iter().rposition(|p| p.name == *name)
}
