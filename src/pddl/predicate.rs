use crate::pddl::{Name, TypeId};
use std::collections::HashMap;

pub type PredId = usize;

#[derive(Debug, Clone)]
pub struct Predicate {
    pub name: Name,
    pub id: PredId,
    /// Declared parameter types, in order.
    pub param_types: Vec<TypeId>,
    /// Appears in some precondition (or the goal).
    pub read: bool,
    /// Appears in some effect. A predicate with `write == false` is static.
    pub write: bool,
    /// Appears in the initial state.
    pub in_init: bool,
    pub is_private: bool,
    /// Pairs a predicate with its synthesised negation twin (both ways).
    pub neg_of: Option<PredId>,
}

impl Predicate {
    pub fn is_static(&self) -> bool {
        !self.write
    }

    pub fn arity(&self) -> usize {
        self.param_types.len()
    }
}

/// The predicate table; also reused for the function table, whose entries
/// share the same shape.
#[derive(Debug, Clone, Default)]
pub struct Predicates {
    preds: Vec<Predicate>,
    table: HashMap<Name, PredId>,
    /// The built-in equality predicate, if registered.
    pub eq_pred: Option<PredId>,
}

impl Predicates {
    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    pub fn get(&self, id: PredId) -> &Predicate {
        &self.preds[id]
    }

    pub fn get_mut(&mut self, id: PredId) -> &mut Predicate {
        &mut self.preds[id]
    }

    pub fn find(&self, name: &str) -> Option<PredId> {
        self.table.get(&Name::new(name)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.preds.iter()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.table.contains_key(name)
    }

    pub fn add(&mut self, name: Name, param_types: Vec<TypeId>) -> PredId {
        debug_assert!(!self.table.contains_key(&name));
        let id = self.preds.len();
        self.preds.push(Predicate {
            name: name.clone(),
            id,
            param_types,
            read: false,
            write: false,
            in_init: false,
            is_private: false,
            neg_of: None,
        });
        self.table.insert(name, id);
        id
    }

    /// Registers `=` as an ordinary binary predicate over `object`.
    pub fn add_eq(&mut self, object_type: TypeId) -> PredId {
        let id = self.add(Name::new("="), vec![object_type, object_type]);
        self.eq_pred = Some(id);
        id
    }

    pub fn is_eq(&self, id: PredId) -> bool {
        self.eq_pred == Some(id)
    }

    /// Synthesises the negation twin of `id`, cross-linking both.
    pub fn add_neg_twin(&mut self, id: PredId) -> PredId {
        debug_assert!(self.preds[id].neg_of.is_none());
        let name = Name::new(format!("NOT-{}", self.preds[id].name));
        let param_types = self.preds[id].param_types.clone();
        let twin = self.add(name, param_types);
        self.preds[twin].neg_of = Some(id);
        self.preds[twin].read = true;
        self.preds[twin].write = self.preds[id].write;
        self.preds[twin].in_init = true;
        self.preds[id].neg_of = Some(twin);
        twin
    }
}
