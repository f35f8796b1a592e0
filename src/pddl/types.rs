//! The type forest: named types with single parents, `either` unions, and
//! per-type object extents.

use crate::error::{Error, Result};
use crate::pddl::{Name, ObjId};
use std::collections::HashMap;

pub type TypeId = usize;

/// The built-in root every declared type descends from.
pub const OBJECT_TYPE: TypeId = 0;

#[derive(Debug, Clone)]
pub struct Type {
    pub name: Name,
    pub parent: Option<TypeId>,
    /// Non-empty iff this is an `either` union of the listed types.
    pub either: Vec<TypeId>,
    pub children: Vec<TypeId>,
    /// Object extent, ascending. For `either` types this is materialised by
    /// [`Types::seal`] once all objects are declared.
    objs: Vec<ObjId>,
}

#[derive(Debug, Clone)]
pub struct Types {
    types: Vec<Type>,
    table: HashMap<Name, TypeId>,
    sealed: bool,
}

impl Default for Types {
    fn default() -> Self {
        let object = Type {
            name: Name::new("object"),
            parent: None,
            either: Vec::new(),
            children: Vec::new(),
            objs: Vec::new(),
        };
        let mut table = HashMap::new();
        table.insert(object.name.clone(), OBJECT_TYPE);
        Self {
            types: vec![object],
            table,
            sealed: false,
        }
    }
}

impl Types {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    pub fn find(&self, name: &str) -> Option<TypeId> {
        self.table.get(&Name::new(name)).copied()
    }

    /// Adds a type under `parent`, or returns the existing id. A re-declared
    /// type keeps its first parent.
    pub fn add(&mut self, name: Name, parent: TypeId) -> TypeId {
        if let Some(&id) = self.table.get(&name) {
            return id;
        }
        let id = self.types.len();
        self.types.push(Type {
            name: name.clone(),
            parent: Some(parent),
            either: Vec::new(),
            children: Vec::new(),
            objs: Vec::new(),
        });
        self.types[parent].children.push(id);
        self.table.insert(name, id);
        id
    }

    /// Adds (or finds) the union type of the given component types.
    pub fn add_either(&mut self, mut members: Vec<TypeId>) -> TypeId {
        members.sort_unstable();
        members.dedup();
        if members.len() == 1 {
            return members[0];
        }
        let name = Name::new(format!(
            "(either {})",
            members
                .iter()
                .map(|&t| self.types[t].name.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        ));
        if let Some(&id) = self.table.get(&name) {
            return id;
        }
        let id = self.types.len();
        self.types.push(Type {
            name: name.clone(),
            parent: None,
            either: members,
            children: Vec::new(),
            objs: Vec::new(),
        });
        self.table.insert(name, id);
        id
    }

    pub fn is_either(&self, id: TypeId) -> bool {
        !self.types[id].either.is_empty()
    }

    /// Reflexive-transitive ancestry under the either-union semantics.
    pub fn is_parent(&self, parent: TypeId, child: TypeId) -> bool {
        if parent == child {
            return true;
        }
        if self.is_either(child) {
            let members = self.types[child].either.clone();
            return members.iter().all(|&m| self.is_parent(parent, m));
        }
        if self.is_either(parent) {
            return self.types[parent]
                .either
                .iter()
                .any(|&m| self.is_parent(m, child));
        }
        let mut cur = self.types[child].parent;
        while let Some(t) = cur {
            if t == parent {
                return true;
            }
            cur = self.types[t].parent;
        }
        false
    }

    /// Two types are disjoint iff neither is an ancestor of the other.
    pub fn are_disjoint(&self, t1: TypeId, t2: TypeId) -> bool {
        !self.is_parent(t1, t2) && !self.is_parent(t2, t1)
    }

    /// Registers an object under its declared type and every ancestor.
    pub fn add_object(&mut self, obj: ObjId, declared: TypeId) -> Result<()> {
        if self.is_either(declared) {
            return Err(Error::semantic(format!(
                "objects cannot be declared with the union type {}",
                self.types[declared].name
            )));
        }
        let mut cur = Some(declared);
        while let Some(t) = cur {
            if self.types[t].objs.last() != Some(&obj) {
                self.types[t].objs.push(obj);
            }
            cur = self.types[t].parent;
        }
        Ok(())
    }

    /// Materialises the extents of `either` types. Must be called after the
    /// last object declaration and before any extent query.
    pub fn seal(&mut self) {
        for id in 0..self.types.len() {
            if self.types[id].either.is_empty() {
                continue;
            }
            let mut union: Vec<ObjId> = self.types[id]
                .either
                .iter()
                .flat_map(|&m| self.types[m].objs.iter().copied())
                .collect();
            union.sort_unstable();
            union.dedup();
            self.types[id].objs = union;
        }
        self.sealed = true;
    }

    pub fn objs_by_type(&self, id: TypeId) -> &[ObjId] {
        debug_assert!(self.sealed || !self.is_either(id));
        &self.types[id].objs
    }

    pub fn num_objs(&self, id: TypeId) -> usize {
        self.objs_by_type(id).len()
    }

    pub fn obj_has_type(&self, id: TypeId, obj: ObjId) -> bool {
        if self.is_either(id) && !self.sealed {
            return self.types[id]
                .either
                .iter()
                .any(|&m| self.obj_has_type(m, obj));
        }
        self.types[id].objs.binary_search(&obj).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest() -> Types {
        let mut types = Types::default();
        let locatable = types.add(Name::new("locatable"), OBJECT_TYPE);
        let truck = types.add(Name::new("truck"), locatable);
        let package = types.add(Name::new("package"), locatable);
        types.add_object(0, truck).unwrap();
        types.add_object(1, truck).unwrap();
        types.add_object(2, package).unwrap();
        types.seal();
        types
    }

    #[test]
    fn ancestry() {
        let types = forest();
        let locatable = types.find("locatable").unwrap();
        let truck = types.find("truck").unwrap();
        let package = types.find("package").unwrap();
        assert!(types.is_parent(OBJECT_TYPE, truck));
        assert!(types.is_parent(locatable, truck));
        assert!(types.is_parent(truck, truck));
        assert!(!types.is_parent(truck, locatable));
        assert!(types.are_disjoint(truck, package));
        assert!(!types.are_disjoint(locatable, package));
    }

    #[test]
    fn extents_follow_the_parent_chain() {
        let types = forest();
        let locatable = types.find("locatable").unwrap();
        let truck = types.find("truck").unwrap();
        assert_eq!(types.objs_by_type(truck), &[0, 1]);
        assert_eq!(types.objs_by_type(locatable), &[0, 1, 2]);
        assert_eq!(types.objs_by_type(OBJECT_TYPE), &[0, 1, 2]);
        assert!(types.obj_has_type(truck, 1));
        assert!(!types.obj_has_type(truck, 2));
    }

    #[test]
    fn either_union_extent_and_disjointness() {
        let mut types = Types::default();
        let a = types.add(Name::new("a"), OBJECT_TYPE);
        let b = types.add(Name::new("b"), OBJECT_TYPE);
        let c = types.add(Name::new("c"), OBJECT_TYPE);
        let ab = types.add_either(vec![a, b]);
        types.add_object(0, a).unwrap();
        types.add_object(1, b).unwrap();
        types.add_object(2, c).unwrap();
        types.seal();

        assert_eq!(types.objs_by_type(ab), &[0, 1]);
        assert!(types.is_parent(OBJECT_TYPE, ab));
        assert!(types.is_parent(ab, a));
        assert!(types.are_disjoint(ab, c));
        assert!(!types.are_disjoint(ab, b));
    }
}
