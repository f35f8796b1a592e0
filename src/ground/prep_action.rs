//! Preprocessed actions: each normalised operator split into the flat atom
//! lists the grounder consumes, with conditional effects lifted into child
//! actions that share the parent's precondition.

use crate::error::{Error, Result};
use crate::ground::GroundAtoms;
use crate::pddl::{Cond, CondAtom, FuncOp, ObjId, Pddl, TypeId, Types};

#[derive(Debug, Clone)]
pub struct PrepAction {
    /// Index of the originating lifted action in `Pddl::actions`.
    pub action_id: usize,
    /// For a conditional-effect child, the index of its parent in
    /// [`PrepActions`].
    pub parent: Option<usize>,
    pub param_types: Vec<TypeId>,
    /// Equality and inequality atoms.
    pub pre_eq: Vec<CondAtom>,
    /// Negative atoms over static predicates, checked against the static
    /// fact table at emission time.
    pub pre_neg_static: Vec<CondAtom>,
    /// Positive non-equality precondition atoms driving unification.
    pub pre: Vec<CondAtom>,
    pub add_eff: Vec<CondAtom>,
    pub del_eff: Vec<CondAtom>,
    pub increase: Vec<FuncOp>,
    pub max_arg_size: usize,
    pub cond_eff_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PrepActions {
    pub actions: Vec<PrepAction>,
}

impl PrepAction {
    fn new(action_id: usize, param_types: Vec<TypeId>) -> Self {
        Self {
            action_id,
            parent: None,
            param_types,
            pre_eq: Vec::new(),
            pre_neg_static: Vec::new(),
            pre: Vec::new(),
            add_eff: Vec::new(),
            del_eff: Vec::new(),
            increase: Vec::new(),
            max_arg_size: 0,
            cond_eff_size: 0,
        }
    }

    fn init_pre(&mut self, pre: &Cond, pddl: &Pddl) -> Result<()> {
        let parts: &[Cond] = match pre {
            Cond::And(parts) => parts,
            Cond::Atom(_) => std::slice::from_ref(pre),
            Cond::Bool(true) => &[],
            _ => {
                return Err(Error::semantic(format!(
                    "precondition of {} is not a simple conjunction",
                    pddl.actions[self.action_id].name
                )))
            }
        };
        for part in parts {
            let Cond::Atom(a) = part else {
                return Err(Error::semantic(format!(
                    "precondition of {} is not a simple conjunction",
                    pddl.actions[self.action_id].name
                )));
            };
            self.max_arg_size = self.max_arg_size.max(a.args.len());
            if pddl.preds.is_eq(a.pred) {
                self.pre_eq.push(a.clone());
            } else if a.neg {
                self.pre_neg_static.push(a.clone());
            } else {
                self.pre.push(a.clone());
            }
        }
        Ok(())
    }

    fn init_eff(&mut self, eff: &Cond, pddl: &Pddl) -> Result<()> {
        let parts: &[Cond] = match eff {
            Cond::And(parts) => parts,
            single => std::slice::from_ref(single),
        };
        for part in parts {
            match part {
                Cond::Atom(a) => {
                    self.max_arg_size = self.max_arg_size.max(a.args.len());
                    if a.neg {
                        self.del_eff.push(a.clone());
                    } else {
                        self.add_eff.push(a.clone());
                    }
                }
                Cond::Increase(op) => self.increase.push(op.clone()),
                Cond::When(..) => self.cond_eff_size += 1,
                Cond::Bool(true) => {}
                Cond::Assign(_) => {
                    return Err(Error::semantic(
                        "(= ...) is not supported in operator effects",
                    ))
                }
                _ => {
                    return Err(Error::semantic(format!(
                        "effect of {} is not a simple conjunction",
                        pddl.actions[self.action_id].name
                    )))
                }
            }
        }
        Ok(())
    }

    /* ----- applicability checks ----- */

    fn check_pre_atom(&self, types: &Types, atom: &CondAtom, args: &[ObjId]) -> bool {
        atom.args.iter().all(|arg| match arg.param() {
            Some(p) => types.obj_has_type(self.param_types[p], args[p]),
            None => true,
        })
    }

    /// Checks whether the fact's arguments can fill precondition slot
    /// `pre_i`: positional types and constants must match.
    fn check_pre_atom_fact(&self, types: &Types, atom: &CondAtom, fact_args: &[ObjId]) -> bool {
        atom.args.iter().enumerate().all(|(i, arg)| match arg {
            crate::pddl::CondArg::Param(p) => {
                types.obj_has_type(self.param_types[*p], fact_args[i])
            }
            crate::pddl::CondArg::Obj(o) => *o == fact_args[i],
        })
    }

    /// Evaluates the equality atoms; with `soft`, slots not yet bound are
    /// ignored.
    pub fn check_eq(&self, args: &[Option<ObjId>], soft: bool) -> bool {
        for atom in &self.pre_eq {
            let resolve = |i: usize| match atom.args[i] {
                crate::pddl::CondArg::Obj(o) => Some(o),
                crate::pddl::CondArg::Param(p) => args[p],
            };
            let (o1, o2) = (resolve(0), resolve(1));
            match (o1, o2) {
                (None, None) => continue,
                (Some(a), Some(b)) => {
                    let eq = a == b;
                    if eq == atom.neg {
                        return false;
                    }
                }
                _ => {
                    if soft {
                        continue;
                    }
                }
            }
        }
        true
    }

    fn check_pre_neg_static(
        &self,
        static_facts: &GroundAtoms,
        args: &[ObjId],
    ) -> bool {
        self.pre_neg_static
            .iter()
            .all(|atom| static_facts.find_cond_atom(atom, args).is_none())
    }

    /// The full applicability test for a complete argument tuple: parameter
    /// types, equalities, and absence of negated static facts.
    pub fn check(&self, types: &Types, static_facts: &GroundAtoms, args: &[ObjId]) -> bool {
        let opt: Vec<Option<ObjId>> = args.iter().copied().map(Some).collect();
        self.pre
            .iter()
            .all(|a| self.check_pre_atom(types, a, args))
            && self.check_eq(&opt, false)
            && self.check_pre_neg_static(static_facts, args)
    }

    /// Whether the fact can be unified into precondition slot `pre_i`;
    /// returns the induced partial binding check result.
    pub fn check_fact(&self, types: &Types, pre_i: usize, fact_args: &[ObjId]) -> bool {
        let atom = &self.pre[pre_i];
        if !self.check_pre_atom_fact(types, atom, fact_args) {
            return false;
        }
        let mut args: Vec<Option<ObjId>> = vec![None; self.param_types.len()];
        for (i, arg) in atom.args.iter().enumerate() {
            if let Some(p) = arg.param() {
                match args[p] {
                    Some(existing) if existing != fact_args[i] => return false,
                    _ => args[p] = Some(fact_args[i]),
                }
            }
        }
        self.check_eq(&args, true)
    }
}

impl PrepActions {
    pub fn new(pddl: &Pddl) -> Result<PrepActions> {
        let mut prep = PrepActions::default();
        for (action_id, action) in pddl.actions.iter().enumerate() {
            let param_types = action.params.iter().map(|p| p.type_).collect();
            let mut a = PrepAction::new(action_id, param_types);
            a.init_pre(&action.pre, pddl).map_err(|e| {
                Error::semantic(format!("preparation of action {} failed: {}", action.name, e))
            })?;
            a.init_eff(&action.eff, pddl).map_err(|e| {
                Error::semantic(format!("preparation of action {} failed: {}", action.name, e))
            })?;
            prep.actions.push(a);
        }

        for parent_idx in 0..prep.actions.len() {
            if prep.actions[parent_idx].cond_eff_size == 0 {
                continue;
            }
            let action_id = prep.actions[parent_idx].action_id;
            let action = &pddl.actions[action_id];
            let Cond::And(parts) = &action.eff else {
                continue;
            };
            for part in parts {
                let Cond::When(when_pre, when_eff) = part else {
                    continue;
                };
                let param_types = prep.actions[parent_idx].param_types.clone();
                let mut child = PrepAction::new(action_id, param_types);
                child.init_pre(when_pre, pddl)?;
                child.init_eff(when_eff, pddl)?;
                if child.cond_eff_size > 0 {
                    return Err(Error::semantic(format!(
                        "preparation of action {} failed: nested conditional effects \
                         are not supported",
                        action.name
                    )));
                }
                child.parent = Some(parent_idx);
                let parent = &prep.actions[parent_idx];
                child.pre_neg_static.extend(parent.pre_neg_static.iter().cloned());
                child.pre_eq.extend(parent.pre_eq.iter().cloned());
                child.pre.extend(parent.pre.iter().cloned());
                child.max_arg_size = child.max_arg_size.max(parent.max_arg_size);
                prep.actions.push(child);
            }
        }
        Ok(prep)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
