//! Hash-consed ground atoms. Argument tuples are interned so that atom
//! identity checks and table lookups reduce to pointer comparisons.

use crate::pddl::{CondAtom, ObjId, PredId};
use internment::Intern;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

pub const TYPICAL_NUM_ARGS: usize = 5;

/// Mutable argument tuple; convert to [`ArgTuple`] once final.
pub type RawArgs = SmallVec<[ObjId; TYPICAL_NUM_ARGS]>;

/// An interned, immutable argument tuple.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgTuple {
    inner: Intern<RawArgs>,
}

impl ArgTuple {
    pub fn new(raw: RawArgs) -> Self {
        Self {
            inner: Intern::new(raw),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjId> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_slice(&self) -> &[ObjId] {
        &self.inner
    }
}

impl From<RawArgs> for ArgTuple {
    fn from(raw: RawArgs) -> Self {
        Self::new(raw)
    }
}

impl From<&[ObjId]> for ArgTuple {
    fn from(raw: &[ObjId]) -> Self {
        Self::new(raw.into())
    }
}

impl std::ops::Index<usize> for ArgTuple {
    type Output = ObjId;

    fn index(&self, index: usize) -> &Self::Output {
        &self.inner[index]
    }
}

impl Debug for ArgTuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}

pub type GroundAtomId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundAtom {
    pub id: GroundAtomId,
    pub pred: PredId,
    pub args: ArgTuple,
    /// Function value for entries of the function table.
    pub func_val: i32,
}

/// An append-only pool of ground atoms keyed on `(pred, args)`.
#[derive(Debug, Clone, Default)]
pub struct GroundAtoms {
    atoms: Vec<GroundAtom>,
    table: HashMap<(PredId, ArgTuple), GroundAtomId>,
}

impl GroundAtoms {
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn get(&self, id: GroundAtomId) -> &GroundAtom {
        &self.atoms[id]
    }

    pub fn get_mut(&mut self, id: GroundAtomId) -> &mut GroundAtom {
        &mut self.atoms[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundAtom> {
        self.atoms.iter()
    }

    /// Adds an atom, returning its id and whether it was new.
    pub fn add(&mut self, pred: PredId, args: RawArgs) -> (GroundAtomId, bool) {
        let args = ArgTuple::new(args);
        if let Some(&id) = self.table.get(&(pred, args)) {
            return (id, false);
        }
        let id = self.atoms.len();
        self.atoms.push(GroundAtom {
            id,
            pred,
            args,
            func_val: 0,
        });
        self.table.insert((pred, args), id);
        (id, true)
    }

    /// Grounds `atom` under the (total) binding and adds it.
    pub fn add_cond_atom(&mut self, atom: &CondAtom, binding: &[ObjId]) -> (GroundAtomId, bool) {
        self.add(atom.pred, atom.ground_args(binding))
    }

    pub fn find(&self, pred: PredId, args: &[ObjId]) -> Option<&GroundAtom> {
        let args = ArgTuple::from(args);
        self.table.get(&(pred, args)).map(|&id| &self.atoms[id])
    }

    /// Looks up `atom` grounded under the binding.
    pub fn find_cond_atom(&self, atom: &CondAtom, binding: &[ObjId]) -> Option<&GroundAtom> {
        self.find(atom.pred, &atom.ground_args(binding))
    }

    /// Looks up a fully grounded atom (no binding needed).
    pub fn find_grounded(&self, atom: &CondAtom) -> Option<&GroundAtom> {
        debug_assert!(atom.is_grounded());
        self.find(atom.pred, &atom.ground_args(&[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn add_is_idempotent() {
        let mut atoms = GroundAtoms::default();
        let (a, new_a) = atoms.add(0, smallvec![1, 2]);
        let (b, new_b) = atoms.add(0, smallvec![1, 2]);
        let (c, new_c) = atoms.add(1, smallvec![1, 2]);
        assert!(new_a && !new_b && new_c);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(atoms.len(), 2);
    }

    #[test]
    fn find_resolves_bindings() {
        use crate::pddl::CondArg;
        let mut atoms = GroundAtoms::default();
        atoms.add(3, smallvec![7, 9]);
        let atom = CondAtom::new(3, smallvec![CondArg::Param(0), CondArg::Obj(9)]);
        assert!(atoms.find_cond_atom(&atom, &[7]).is_some());
        assert!(atoms.find_cond_atom(&atom, &[8]).is_none());
    }
}
