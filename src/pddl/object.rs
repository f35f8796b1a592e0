use crate::pddl::{Name, TypeId};
use std::collections::HashMap;

pub type ObjId = usize;

#[derive(Debug, Clone)]
pub struct Object {
    pub name: Name,
    pub id: ObjId,
    pub type_: TypeId,
    pub is_constant: bool,
    pub is_private: bool,
    pub owner: Option<ObjId>,
    pub is_agent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Objects {
    objs: Vec<Object>,
    table: HashMap<Name, ObjId>,
}

impl Objects {
    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    pub fn get(&self, id: ObjId) -> &Object {
        &self.objs[id]
    }

    pub fn find(&self, name: &str) -> Option<ObjId> {
        self.table.get(&Name::new(name)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.objs.iter()
    }

    /// Adds an object; re-declaring a name returns the existing id.
    pub fn add(&mut self, name: Name, type_: TypeId, is_constant: bool) -> (ObjId, bool) {
        if let Some(&id) = self.table.get(&name) {
            return (id, false);
        }
        let id = self.objs.len();
        self.objs.push(Object {
            name: name.clone(),
            id,
            type_,
            is_constant,
            is_private: false,
            owner: None,
            is_agent: false,
        });
        self.table.insert(name, id);
        (id, true)
    }

    pub fn mark_private(&mut self, id: ObjId, owner: Option<ObjId>) {
        self.objs[id].is_private = true;
        self.objs[id].owner = owner;
    }
}
