//! The condition tree used for preconditions, effects, the initial state
//! and the goal. Clone, negate and traversal are plain fold recursions over
//! the sum type.

use crate::error::{Error, Result};
use crate::pddl::{ObjId, PredId};
use smallvec::SmallVec;

/// An atom argument: either a concrete object or a 0-based index into the
/// enclosing parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CondArg {
    Obj(ObjId),
    Param(usize),
}

impl CondArg {
    pub fn param(&self) -> Option<usize> {
        match self {
            CondArg::Param(p) => Some(*p),
            CondArg::Obj(_) => None,
        }
    }

    pub fn obj(&self) -> Option<ObjId> {
        match self {
            CondArg::Obj(o) => Some(*o),
            CondArg::Param(_) => None,
        }
    }
}

pub type CondArgs = SmallVec<[CondArg; 5]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CondAtom {
    pub pred: PredId,
    pub args: CondArgs,
    pub neg: bool,
}

impl CondAtom {
    pub fn new(pred: PredId, args: CondArgs) -> Self {
        Self {
            pred,
            args,
            neg: false,
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.args.iter().all(|a| a.param().is_none())
    }

    /// Resolves argument `i` under a (possibly partial) parameter binding.
    pub fn arg_obj(&self, i: usize, binding: &[Option<ObjId>]) -> Option<ObjId> {
        match self.args[i] {
            CondArg::Obj(o) => Some(o),
            CondArg::Param(p) => binding[p],
        }
    }

    /// Grounds all arguments under a total binding.
    pub fn ground_args(&self, binding: &[ObjId]) -> SmallVec<[ObjId; 5]> {
        self.args
            .iter()
            .map(|a| match a {
                CondArg::Obj(o) => *o,
                CondArg::Param(p) => binding[*p],
            })
            .collect()
    }

    fn substitute(&mut self, param: usize, obj: ObjId) {
        for arg in self.args.iter_mut() {
            if *arg == CondArg::Param(param) {
                *arg = CondArg::Obj(obj);
            }
        }
    }

    /// Same predicate and, position by position, equal resolved objects or
    /// equal parameter indices.
    pub fn same_under(&self, other: &CondAtom, binding: &[Option<ObjId>]) -> bool {
        if self.pred != other.pred {
            return false;
        }
        self.args.iter().zip(other.args.iter()).all(|(a, b)| {
            let resolve = |arg: &CondArg| match arg {
                CondArg::Obj(o) => (Some(*o), None),
                CondArg::Param(p) => (binding[*p], Some(*p)),
            };
            let (ao, ap) = resolve(a);
            let (bo, bp) = resolve(b);
            match (ao, bo) {
                (Some(x), Some(y)) => x == y,
                (None, None) => ap == bp,
                _ => false,
            }
        })
    }
}

/// A function assignment `(= (f ...) n)` or cost increase
/// `(increase (total-cost) n | (f ...))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncOp {
    pub lvalue: CondAtom,
    pub value: i32,
    pub fvalue: Option<CondAtom>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    And(Vec<Cond>),
    Or(Vec<Cond>),
    /// Universal quantification over the parameter at the given index of
    /// the owning action's parameter list.
    Forall(usize, Box<Cond>),
    Exists(usize, Box<Cond>),
    When(Box<Cond>, Box<Cond>),
    Atom(CondAtom),
    Assign(FuncOp),
    Increase(FuncOp),
    Bool(bool),
    Imply(Box<Cond>, Box<Cond>),
}

/// A positive or negative effect atom together with the condition of the
/// `(when ...)` it sits in, if any.
#[derive(Debug, Clone, Copy)]
pub struct EffAtom<'a> {
    pub when_pre: Option<&'a Cond>,
    pub atom: &'a CondAtom,
}

impl Cond {
    pub const TRUE: Cond = Cond::Bool(true);
    pub const FALSE: Cond = Cond::Bool(false);

    /// Negation with push-down. Negating `(when ...)` or a function
    /// operation is a structural error.
    pub fn negate(&self) -> Result<Cond> {
        Ok(match self {
            Cond::And(parts) => {
                Cond::Or(parts.iter().map(|c| c.negate()).collect::<Result<_>>()?)
            }
            Cond::Or(parts) => {
                Cond::And(parts.iter().map(|c| c.negate()).collect::<Result<_>>()?)
            }
            Cond::Forall(p, body) => Cond::Exists(*p, Box::new(body.negate()?)),
            Cond::Exists(p, body) => Cond::Forall(*p, Box::new(body.negate()?)),
            Cond::Atom(a) => {
                let mut a = a.clone();
                a.neg = !a.neg;
                Cond::Atom(a)
            }
            Cond::Bool(v) => Cond::Bool(!v),
            Cond::Imply(left, right) => {
                Cond::And(vec![(**left).clone(), right.negate()?])
            }
            Cond::When(..) => {
                return Err(Error::semantic("cannot negate a conditional effect"))
            }
            Cond::Assign(..) | Cond::Increase(..) => {
                return Err(Error::semantic("cannot negate a function assignment"))
            }
        })
    }

    /// Replaces every occurrence of the parameter with the object.
    pub fn substitute(&mut self, param: usize, obj: ObjId) {
        match self {
            Cond::And(parts) | Cond::Or(parts) => {
                for c in parts {
                    c.substitute(param, obj);
                }
            }
            Cond::Forall(_, body) | Cond::Exists(_, body) => body.substitute(param, obj),
            Cond::When(pre, eff) => {
                pre.substitute(param, obj);
                eff.substitute(param, obj);
            }
            Cond::Atom(a) => a.substitute(param, obj),
            Cond::Assign(f) | Cond::Increase(f) => {
                f.lvalue.substitute(param, obj);
                if let Some(fv) = &mut f.fvalue {
                    fv.substitute(param, obj);
                }
            }
            Cond::Bool(_) => {}
            Cond::Imply(left, right) => {
                left.substitute(param, obj);
                right.substitute(param, obj);
            }
        }
    }

    /// Visits every atom in the tree.
    pub fn visit_atoms<'a>(&'a self, f: &mut impl FnMut(&'a CondAtom)) {
        match self {
            Cond::And(parts) | Cond::Or(parts) => {
                for c in parts {
                    c.visit_atoms(f);
                }
            }
            Cond::Forall(_, body) | Cond::Exists(_, body) => body.visit_atoms(f),
            Cond::When(pre, eff) => {
                pre.visit_atoms(f);
                eff.visit_atoms(f);
            }
            Cond::Atom(a) => f(a),
            Cond::Assign(op) | Cond::Increase(op) => {
                f(&op.lvalue);
                if let Some(fv) = &op.fvalue {
                    f(fv);
                }
            }
            Cond::Bool(_) => {}
            Cond::Imply(left, right) => {
                left.visit_atoms(f);
                right.visit_atoms(f);
            }
        }
    }

    /// The atoms of a normalised conjunction (`AND` of atoms, or a single
    /// atom, or a boolean). Anything else is a semantic error.
    pub fn conjunction_atoms(&self) -> Result<Vec<&CondAtom>> {
        match self {
            Cond::Atom(a) => Ok(vec![a]),
            Cond::Bool(_) => Ok(Vec::new()),
            Cond::And(parts) => {
                let mut out = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        Cond::Atom(a) => out.push(a),
                        Cond::Bool(true) => {}
                        other => {
                            return Err(Error::semantic(format!(
                                "expected a conjunction of atoms, found {:?}",
                                cond_kind(other)
                            )))
                        }
                    }
                }
                Ok(out)
            }
            other => Err(Error::semantic(format!(
                "expected a conjunction of atoms, found {:?}",
                cond_kind(other)
            ))),
        }
    }

    /// Positive effect atoms of a normalised effect, including those inside
    /// `(when ...)` children, each paired with its local condition.
    pub fn add_effects(&self) -> Vec<EffAtom<'_>> {
        self.effect_atoms(false)
    }

    /// Negative effect atoms of a normalised effect.
    pub fn del_effects(&self) -> Vec<EffAtom<'_>> {
        self.effect_atoms(true)
    }

    fn effect_atoms(&self, neg: bool) -> Vec<EffAtom<'_>> {
        let mut out = Vec::new();
        self.collect_effect_atoms(neg, None, &mut out);
        out
    }

    fn collect_effect_atoms<'a>(
        &'a self,
        neg: bool,
        when_pre: Option<&'a Cond>,
        out: &mut Vec<EffAtom<'a>>,
    ) {
        match self {
            Cond::And(parts) => {
                for c in parts {
                    c.collect_effect_atoms(neg, when_pre, out);
                }
            }
            Cond::When(pre, eff) => eff.collect_effect_atoms(neg, Some(pre), out),
            Cond::Atom(a) if a.neg == neg => out.push(EffAtom { when_pre, atom: a }),
            _ => {}
        }
    }
}

pub(crate) fn cond_kind(c: &Cond) -> &'static str {
    match c {
        Cond::And(_) => "and",
        Cond::Or(_) => "or",
        Cond::Forall(..) => "forall",
        Cond::Exists(..) => "exists",
        Cond::When(..) => "when",
        Cond::Atom(_) => "atom",
        Cond::Assign(_) => "assign",
        Cond::Increase(_) => "increase",
        Cond::Bool(_) => "bool",
        Cond::Imply(..) => "imply",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn atom(pred: PredId, args: &[CondArg]) -> Cond {
        Cond::Atom(CondAtom::new(pred, args.iter().copied().collect()))
    }

    #[test]
    fn negation_pushes_down() {
        let c = Cond::And(vec![
            atom(0, &[CondArg::Param(0)]),
            Cond::Or(vec![atom(1, &[]), Cond::Bool(false)]),
        ]);
        let n = c.negate().unwrap();
        match n {
            Cond::Or(parts) => {
                assert!(matches!(&parts[0], Cond::Atom(a) if a.neg));
                match &parts[1] {
                    Cond::And(inner) => {
                        assert!(matches!(&inner[0], Cond::Atom(a) if a.neg));
                        assert_eq!(inner[1], Cond::Bool(true));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn negating_when_is_rejected() {
        let c = Cond::When(Box::new(Cond::Bool(true)), Box::new(Cond::Bool(true)));
        assert!(c.negate().is_err());
    }

    #[test]
    fn substitution_grounds_parameters() {
        let mut c = Cond::Exists(1, Box::new(atom(2, &[CondArg::Param(1), CondArg::Param(0)])));
        c.substitute(1, 7);
        match c {
            Cond::Exists(_, body) => match *body {
                Cond::Atom(a) => {
                    assert_eq!(a.args[0], CondArg::Obj(7));
                    assert_eq!(a.args[1], CondArg::Param(0));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn effect_atoms_track_when_conditions() {
        let when_pre = atom(0, &[]);
        let eff = Cond::And(vec![
            atom(1, &[]),
            Cond::When(
                Box::new(when_pre.clone()),
                Box::new(Cond::And(vec![atom(2, &[]), {
                    let mut a = CondAtom::new(3, smallvec![]);
                    a.neg = true;
                    Cond::Atom(a)
                }])),
            ),
        ]);
        let adds = eff.add_effects();
        assert_eq!(adds.len(), 2);
        assert!(adds[0].when_pre.is_none());
        assert_eq!(adds[1].when_pre, Some(&when_pre));
        let dels = eff.del_effects();
        assert_eq!(dels.len(), 1);
        assert_eq!(dels[0].atom.pred, 3);
    }
}
