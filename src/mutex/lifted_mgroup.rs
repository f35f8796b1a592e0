//! Lifted mutex groups: a parameter list (some parameters counted) plus a
//! conjunction of atoms over those parameters.

use crate::pddl::{CondArg, CondAtom, ObjId, Param, Params, Pddl, PredId, Types};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct LiftedMGroup {
    pub params: Params,
    pub atoms: Vec<CondAtom>,
    pub is_exactly_one: bool,
    pub is_static: bool,
}

impl LiftedMGroup {
    pub fn new(params: Params, atoms: Vec<CondAtom>) -> Self {
        let mut mg = Self {
            params,
            atoms,
            is_exactly_one: false,
            is_static: false,
        };
        mg.sort();
        mg
    }

    /// The initial candidate covering every grounding of one predicate;
    /// `counted` marks one parameter position as the counted variable.
    pub fn cand_from_pred(
        pred_id: PredId,
        param_types: &[usize],
        counted: Option<usize>,
    ) -> Self {
        let params: Params = param_types
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let mut p = Param::counted(t);
                p.is_counted_var = counted.map(|c| c == i).unwrap_or(false);
                p
            })
            .collect();
        let args = (0..param_types.len()).map(CondArg::Param).collect();
        Self::new(params, vec![CondAtom::new(pred_id, args)])
    }

    /// Stable sort of the atom conjunction by predicate.
    pub fn sort(&mut self) {
        self.atoms.sort_by_key(|a| a.pred);
    }

    pub fn has_pred(&self, pred: PredId) -> bool {
        self.atoms.iter().any(|a| a.pred == pred)
    }

    pub fn has_counted_var(&self) -> bool {
        self.params.iter().any(|p| p.is_counted_var)
    }

    pub fn atom_has_counted_var(&self, atom: &CondAtom) -> bool {
        atom.args.iter().any(|a| {
            a.param()
                .map(|p| self.params[p].is_counted_var)
                .unwrap_or(false)
        })
    }

    pub fn counted_vars_of(&self, atom: &CondAtom) -> Vec<usize> {
        let mut out: Vec<usize> = atom
            .args
            .iter()
            .filter_map(|a| a.param())
            .filter(|&p| self.params[p].is_counted_var)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every parameter whose type extent is a single object is replaced by
    /// that object and dropped from the parameter list.
    pub fn replace_single_object_types(&mut self, types: &Types) {
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(self.params.len());
        let mut kept: Params = Vec::new();
        for param in &self.params {
            if types.num_objs(param.type_) == 1 {
                let obj = types.objs_by_type(param.type_)[0];
                let pid = remap.len();
                for atom in &mut self.atoms {
                    for arg in atom.args.iter_mut() {
                        if arg.param() == Some(pid) {
                            *arg = CondArg::Obj(obj);
                        }
                    }
                }
                remap.push(None);
            } else {
                remap.push(Some(kept.len()));
                kept.push(param.clone());
            }
        }
        for atom in &mut self.atoms {
            for arg in atom.args.iter_mut() {
                if let Some(p) = arg.param() {
                    *arg = CondArg::Param(remap[p].expect("substituted parameter still in use"));
                }
            }
        }
        self.params = kept;
    }

    /// Instantiates the parameters bound in `args` and drops them.
    pub fn instantiate(&self, args: &[Option<ObjId>]) -> Self {
        let mut mg = self.clone();
        for atom in &mut mg.atoms {
            for arg in atom.args.iter_mut() {
                if let Some(p) = arg.param() {
                    if let Some(obj) = args[p] {
                        *arg = CondArg::Obj(obj);
                    }
                }
            }
        }
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(mg.params.len());
        let mut kept: Params = Vec::new();
        for (i, param) in mg.params.iter().enumerate() {
            if args[i].is_some() {
                remap.push(None);
            } else {
                remap.push(Some(kept.len()));
                kept.push(param.clone());
            }
        }
        for atom in &mut mg.atoms {
            for arg in atom.args.iter_mut() {
                if let Some(p) = arg.param() {
                    *arg = CondArg::Param(remap[p].expect("instantiated parameter still in use"));
                }
            }
        }
        mg.params = kept;
        mg.sort();
        mg
    }

    fn cmp_key(&self) -> (usize, Vec<(PredId, Vec<CondArg>)>, Vec<(bool, usize)>) {
        (
            self.atoms.len(),
            self.atoms
                .iter()
                .map(|a| (a.pred, a.args.iter().copied().collect()))
                .collect(),
            self.params
                .iter()
                .map(|p| (p.is_counted_var, p.type_))
                .collect(),
        )
    }
}

/// Equality and hashing ignore parameter names and the proved flags: two
/// lifted mgroups are the same candidate iff their sorted atom lists and
/// their parameter type/counted vectors coincide.
impl PartialEq for LiftedMGroup {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key() == other.cmp_key()
    }
}

impl Eq for LiftedMGroup {}

impl Hash for LiftedMGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for p in &self.params {
            p.type_.hash(state);
            p.is_counted_var.hash(state);
        }
        for a in &self.atoms {
            a.pred.hash(state);
            for arg in &a.args {
                arg.hash(state);
            }
        }
    }
}

impl PartialOrd for LiftedMGroup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LiftedMGroup {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiftedMGroups {
    pub groups: Vec<LiftedMGroup>,
}

impl LiftedMGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn add(&mut self, mg: LiftedMGroup) {
        self.groups.push(mg);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiftedMGroup> {
        self.groups.iter()
    }

    pub fn sort_and_uniq(&mut self) {
        self.groups.sort();
        self.groups.dedup();
    }

    /// The subset of groups instantiated against goal atoms: for every
    /// goal atom unifiable with a group atom, the group with the matched
    /// fixed parameters pinned.
    pub fn extract_goal_aware(&self, pddl: &Pddl) -> LiftedMGroups {
        let mut out = LiftedMGroups::default();
        let goal_atoms: Vec<&CondAtom> = match pddl.goal.conjunction_atoms() {
            Ok(atoms) => atoms,
            Err(_) => return out,
        };
        for mg in &self.groups {
            let mut args = vec![None; mg.params.len()];
            for goal in &goal_atoms {
                if goal.neg {
                    continue;
                }
                for atom in &mg.atoms {
                    if atom.pred != goal.pred {
                        continue;
                    }
                    if unify_fact(&pddl.types, goal, None, &mg.params, atom, &mut args) {
                        out.add(mg.instantiate(&args));
                    }
                }
            }
        }
        out.sort_and_uniq();
        out
    }

    /// True iff two distinct atoms of the grounded conjunction unify with
    /// the same group under a consistent binding, i.e. the conjunction can
    /// never hold in a reachable state.
    pub fn is_grounded_conj_too_heavy(
        &self,
        pddl: &Pddl,
        conj: &[CondAtom],
        conj_args: &[ObjId],
    ) -> bool {
        for mg in &self.groups {
            if grounded_conj_too_heavy(mg, pddl, conj, conj_args) {
                return true;
            }
        }
        false
    }

    /// True iff applying the grounded action deletes a covered atom of any
    /// group without adding a replacement.
    pub fn any_is_deleted(
        &self,
        pddl: &Pddl,
        pre: &[CondAtom],
        add_eff: &[CondAtom],
        del_eff: &[CondAtom],
        args: &[ObjId],
    ) -> bool {
        self.groups
            .iter()
            .any(|mg| mgroup_is_deleted(mg, pddl, pre, add_eff, del_eff, args))
    }
}

/* ----- unification of grounded atoms against group atoms ----- */

/// Unifies a (possibly schematically grounded) fact with a group atom,
/// resetting and filling `cand_arg` for the group's fixed parameters.
pub(crate) fn unify_fact(
    types: &Types,
    fact: &CondAtom,
    fact_args: Option<&[ObjId]>,
    cand_params: &Params,
    cand_atom: &CondAtom,
    cand_arg: &mut Vec<Option<ObjId>>,
) -> bool {
    for slot in cand_arg.iter_mut() {
        *slot = None;
    }
    unify_fact_cont(types, fact, fact_args, cand_params, cand_atom, cand_arg)
}

/// Like [`unify_fact`] but keeps the existing binding; used to check
/// whether a second fact fits the same grounding.
pub(crate) fn can_unify_fact(
    types: &Types,
    fact: &CondAtom,
    fact_args: Option<&[ObjId]>,
    cand_params: &Params,
    cand_atom: &CondAtom,
    cand_arg: &[Option<ObjId>],
) -> bool {
    let mut scratch = cand_arg.to_vec();
    unify_fact_cont(types, fact, fact_args, cand_params, cand_atom, &mut scratch)
}

fn unify_fact_cont(
    types: &Types,
    fact: &CondAtom,
    fact_args: Option<&[ObjId]>,
    cand_params: &Params,
    cand_atom: &CondAtom,
    cand_arg: &mut Vec<Option<ObjId>>,
) -> bool {
    if fact.pred != cand_atom.pred {
        return false;
    }
    debug_assert_eq!(fact.args.len(), cand_atom.args.len());
    for i in 0..fact.args.len() {
        let fact_obj = match (fact.args[i], fact_args) {
            (CondArg::Obj(o), _) => o,
            (CondArg::Param(p), Some(args)) => args[p],
            (CondArg::Param(_), None) => return false,
        };
        match cand_atom.args[i] {
            CondArg::Param(p) => {
                if !types.obj_has_type(cand_params[p].type_, fact_obj) {
                    return false;
                }
                if !cand_params[p].is_counted_var {
                    match cand_arg[p] {
                        None => cand_arg[p] = Some(fact_obj),
                        Some(bound) if bound != fact_obj => return false,
                        Some(_) => {}
                    }
                }
            }
            CondArg::Obj(o) => {
                if o != fact_obj {
                    return false;
                }
            }
        }
    }
    true
}

fn atoms_equal_grounded(a1: &CondAtom, a2: &CondAtom, args: &[ObjId]) -> bool {
    if a1.pred != a2.pred {
        return false;
    }
    (0..a1.args.len()).all(|i| {
        let resolve = |arg: &CondArg| match arg {
            CondArg::Obj(o) => *o,
            CondArg::Param(p) => args[*p],
        };
        resolve(&a1.args[i]) == resolve(&a2.args[i])
    })
}

fn grounded_conj_too_heavy(
    mg: &LiftedMGroup,
    pddl: &Pddl,
    conj: &[CondAtom],
    conj_args: &[ObjId],
) -> bool {
    let mut arg = vec![None; mg.params.len()];
    for (i, a1) in conj.iter().enumerate() {
        if a1.neg {
            continue;
        }
        for cand1 in &mg.atoms {
            if cand1.pred != a1.pred {
                continue;
            }
            if !unify_fact(&pddl.types, a1, Some(conj_args), &mg.params, cand1, &mut arg) {
                continue;
            }
            for a2 in conj.iter().skip(i + 1) {
                if a2.neg || atoms_equal_grounded(a1, a2, conj_args) {
                    continue;
                }
                for cand2 in &mg.atoms {
                    if cand2.pred != a2.pred {
                        continue;
                    }
                    if can_unify_fact(
                        &pddl.types,
                        a2,
                        Some(conj_args),
                        &mg.params,
                        cand2,
                        &arg,
                    ) {
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn equal_atom_in(atom: &CondAtom, conj: &[CondAtom], args: &[ObjId]) -> bool {
    conj.iter()
        .any(|c| !c.neg && atoms_equal_grounded(atom, c, args))
}

fn mgroup_is_deleted(
    mg: &LiftedMGroup,
    pddl: &Pddl,
    pre: &[CondAtom],
    add_eff: &[CondAtom],
    del_eff: &[CondAtom],
    args: &[ObjId],
) -> bool {
    let mut mg_arg = vec![None; mg.params.len()];

    // an add effect matching the group means the group cannot be emptied
    for a in add_eff {
        for m in &mg.atoms {
            if m.pred != a.pred {
                continue;
            }
            if unify_fact(&pddl.types, a, Some(args), &mg.params, m, &mut mg_arg) {
                return false;
            }
        }
    }

    for d in del_eff {
        for m in &mg.atoms {
            if m.pred != d.pred {
                continue;
            }
            if unify_fact(&pddl.types, d, Some(args), &mg.params, m, &mut mg_arg)
                && equal_atom_in(d, pre, args)
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pddl::Name;
    use smallvec::smallvec;

    #[test]
    fn candidate_equality_ignores_param_names() {
        let mut p1 = Param::counted(0);
        p1.name = Name::new("?a");
        let mut p2 = Param::counted(0);
        p2.name = Name::new("?b");
        let atom = CondAtom::new(0, smallvec![CondArg::Param(0)]);
        let m1 = LiftedMGroup::new(vec![p1], vec![atom.clone()]);
        let m2 = LiftedMGroup::new(vec![p2], vec![atom]);
        assert_eq!(m1, m2);
    }

    #[test]
    fn sort_and_uniq_is_a_fixed_point() {
        let atom0 = CondAtom::new(0, smallvec![CondArg::Param(0)]);
        let atom1 = CondAtom::new(1, smallvec![CondArg::Param(0)]);
        let mut groups = LiftedMGroups::default();
        groups.add(LiftedMGroup::new(vec![Param::counted(0)], vec![atom1.clone()]));
        groups.add(LiftedMGroup::new(vec![Param::counted(0)], vec![atom0.clone()]));
        groups.add(LiftedMGroup::new(vec![Param::counted(0)], vec![atom0]));
        groups.sort_and_uniq();
        assert_eq!(groups.len(), 2);
        let snapshot = groups.groups.clone();
        groups.sort_and_uniq();
        assert_eq!(groups.groups, snapshot);
    }
}
