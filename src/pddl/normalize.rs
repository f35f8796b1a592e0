//! Rewrites condition trees into the canonical form the grounder consumes:
//! quantifiers instantiated over type extents, implications removed, static
//! atoms evaluated against the initial state, booleans absorbed,
//! disjunctions pushed above conjunctions, duplicates and conflicts
//! resolved, and bound equalities propagated.

use crate::error::Result;
use crate::pddl::{
    Action, Cond, CondArg, CondAtom, CondArgs, ObjId, Params, PredId, Predicates, Types,
};
use std::collections::HashMap;

/// Grounded initial-state atoms indexed by predicate, used to evaluate
/// static atoms at normalisation time.
#[derive(Debug, Clone, Default)]
pub struct InitIndex {
    by_pred: HashMap<PredId, Vec<CondArgs>>,
}

impl InitIndex {
    pub fn insert(&mut self, atom: &CondAtom) {
        debug_assert!(atom.is_grounded() && !atom.neg);
        self.by_pred
            .entry(atom.pred)
            .or_default()
            .push(atom.args.clone());
    }

    pub fn contains(&self, atom: &CondAtom) -> bool {
        self.by_pred
            .get(&atom.pred)
            .map(|tuples| tuples.iter().any(|t| *t == atom.args))
            .unwrap_or(false)
    }

    /// True if some initial atom agrees with `atom` on every argument slot
    /// already bound to an object.
    pub fn partial_match(&self, atom: &CondAtom) -> bool {
        let Some(tuples) = self.by_pred.get(&atom.pred) else {
            return false;
        };
        tuples.iter().any(|t| {
            atom.args
                .iter()
                .zip(t.iter())
                .all(|(a, b)| match a {
                    CondArg::Param(_) => true,
                    CondArg::Obj(_) => a == b,
                })
        })
    }
}

pub(crate) struct NormEnv<'a> {
    pub types: &'a Types,
    pub preds: &'a Predicates,
    pub init: &'a InitIndex,
    /// Whether static atoms are substituted by their initial-state value.
    /// Operator conditions are; the goal keeps its atoms so unreachable
    /// goal facts stay representable downstream.
    pub eval_static: bool,
}

/// Full normalisation of one condition tree.
pub(crate) fn normalize_cond(c: Cond, env: &NormEnv, params: &Params) -> Result<Cond> {
    let c = instantiate_quantifiers(c, env, params);
    let c = remove_imply(c)?;
    let c = remove_bool(c, env);
    let c = flatten(c);
    let c = to_dnf(c);
    let c = split_or_when(c);
    let c = flatten(c);
    let c = deduplicate(c);
    Ok(c)
}

/// FORALL becomes a conjunction over the parameter's type extent, EXISTS a
/// disjunction; empty extents collapse to the absorbing boolean.
fn instantiate_quantifiers(c: Cond, env: &NormEnv, params: &Params) -> Cond {
    match c {
        Cond::Forall(param, body) => {
            let body = instantiate_quantifiers(*body, env, params);
            let objs = env.types.objs_by_type(params[param].type_);
            let parts = objs
                .iter()
                .map(|&o| {
                    let mut inst = body.clone();
                    inst.substitute(param, o);
                    inst
                })
                .collect::<Vec<_>>();
            Cond::And(parts)
        }
        Cond::Exists(param, body) => {
            let body = instantiate_quantifiers(*body, env, params);
            let objs = env.types.objs_by_type(params[param].type_);
            let parts = objs
                .iter()
                .map(|&o| {
                    let mut inst = body.clone();
                    inst.substitute(param, o);
                    inst
                })
                .collect::<Vec<_>>();
            Cond::Or(parts)
        }
        Cond::And(parts) => Cond::And(
            parts
                .into_iter()
                .map(|p| instantiate_quantifiers(p, env, params))
                .collect(),
        ),
        Cond::Or(parts) => Cond::Or(
            parts
                .into_iter()
                .map(|p| instantiate_quantifiers(p, env, params))
                .collect(),
        ),
        Cond::When(pre, eff) => Cond::When(
            Box::new(instantiate_quantifiers(*pre, env, params)),
            Box::new(instantiate_quantifiers(*eff, env, params)),
        ),
        Cond::Imply(left, right) => Cond::Imply(
            Box::new(instantiate_quantifiers(*left, env, params)),
            Box::new(instantiate_quantifiers(*right, env, params)),
        ),
        leaf => leaf,
    }
}

/// `(imply L R)` becomes `(or (not L) R)`.
fn remove_imply(c: Cond) -> Result<Cond> {
    Ok(match c {
        Cond::Imply(left, right) => {
            let left = remove_imply(*left)?;
            let right = remove_imply(*right)?;
            Cond::Or(vec![left.negate()?, right])
        }
        Cond::And(parts) => Cond::And(parts.into_iter().map(remove_imply).collect::<Result<_>>()?),
        Cond::Or(parts) => Cond::Or(parts.into_iter().map(remove_imply).collect::<Result<_>>()?),
        Cond::When(pre, eff) => Cond::When(
            Box::new(remove_imply(*pre)?),
            Box::new(remove_imply(*eff)?),
        ),
        leaf => leaf,
    })
}

/// Evaluates equality atoms and static atoms, then absorbs booleans.
fn remove_bool(c: Cond, env: &NormEnv) -> Cond {
    match c {
        Cond::Atom(atom) => remove_bool_atom(atom, env),
        Cond::And(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for part in parts {
                match remove_bool(part, env) {
                    Cond::Bool(true) => {}
                    Cond::Bool(false) => return Cond::Bool(false),
                    other => out.push(other),
                }
            }
            if out.is_empty() {
                Cond::Bool(true)
            } else {
                Cond::And(out)
            }
        }
        Cond::Or(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for part in parts {
                match remove_bool(part, env) {
                    Cond::Bool(false) => {}
                    Cond::Bool(true) => return Cond::Bool(true),
                    other => out.push(other),
                }
            }
            if out.is_empty() {
                Cond::Bool(false)
            } else {
                Cond::Or(out)
            }
        }
        Cond::When(pre, eff) => {
            let pre = remove_bool(*pre, env);
            let eff = remove_bool(*eff, env);
            match pre {
                Cond::Bool(true) => eff,
                Cond::Bool(false) => Cond::Bool(true),
                pre => Cond::When(Box::new(pre), Box::new(eff)),
            }
        }
        leaf => leaf,
    }
}

fn remove_bool_atom(atom: CondAtom, env: &NormEnv) -> Cond {
    if env.preds.is_eq(atom.pred) {
        if let (Some(o1), Some(o2)) = (atom.args[0].obj(), atom.args[1].obj()) {
            return Cond::Bool((o1 == o2) != atom.neg);
        }
        return Cond::Atom(atom);
    }

    if env.eval_static && env.preds.get(atom.pred).is_static() {
        if atom.is_grounded() {
            return Cond::Bool(env.init.contains(&CondAtom {
                neg: false,
                ..atom.clone()
            }) != atom.neg);
        }
        if atom.neg && !env.init.partial_match(&atom) {
            // No initial atom matches the grounded slots, so the negation
            // holds for every instantiation.
            return Cond::Bool(true);
        }
    }

    Cond::Atom(atom)
}

/// Merges nested conjunctions/disjunctions and collapses unit nodes.
fn flatten(c: Cond) -> Cond {
    match c {
        Cond::And(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for part in parts.into_iter().map(flatten) {
                match part {
                    Cond::And(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            if out.len() == 1 {
                out.pop().unwrap()
            } else {
                Cond::And(out)
            }
        }
        Cond::Or(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for part in parts.into_iter().map(flatten) {
                match part {
                    Cond::Or(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            if out.len() == 1 {
                out.pop().unwrap()
            } else {
                Cond::Or(out)
            }
        }
        Cond::When(pre, eff) => Cond::When(Box::new(flatten(*pre)), Box::new(flatten(*eff))),
        leaf => leaf,
    }
}

/// Pushes disjunctions above conjunctions so the result is an OR of ANDs
/// (or a single AND). `when` nodes are handled separately.
fn to_dnf(c: Cond) -> Cond {
    match c {
        Cond::And(parts) => {
            let parts: Vec<Cond> = parts.into_iter().map(to_dnf).collect();
            if let Some(pos) = parts.iter().position(|p| matches!(p, Cond::Or(_))) {
                let mut rest = parts;
                let Cond::Or(choices) = rest.remove(pos) else {
                    unreachable!()
                };
                let distributed = choices
                    .into_iter()
                    .map(|choice| {
                        let mut conj = rest.clone();
                        conj.push(choice);
                        to_dnf(flatten(Cond::And(conj)))
                    })
                    .collect();
                flatten(Cond::Or(distributed))
            } else {
                Cond::And(parts)
            }
        }
        Cond::Or(parts) => flatten(Cond::Or(parts.into_iter().map(to_dnf).collect())),
        Cond::When(pre, eff) => Cond::When(Box::new(to_dnf(*pre)), Box::new(to_dnf(*eff))),
        leaf => leaf,
    }
}

/// A `(when (or ...) eff)` splits into one conditional effect per disjunct.
fn split_or_when(c: Cond) -> Cond {
    match c {
        Cond::When(pre, eff) => {
            let eff = split_or_when(*eff);
            match *pre {
                Cond::Or(choices) => Cond::And(
                    choices
                        .into_iter()
                        .map(|choice| Cond::When(Box::new(choice), Box::new(eff.clone())))
                        .collect(),
                ),
                pre => Cond::When(Box::new(pre), Box::new(eff)),
            }
        }
        Cond::And(parts) => Cond::And(parts.into_iter().map(split_or_when).collect()),
        Cond::Or(parts) => Cond::Or(parts.into_iter().map(split_or_when).collect()),
        leaf => leaf,
    }
}

/// Removes duplicate atoms inside every flat AND/OR.
fn deduplicate(c: Cond) -> Cond {
    match c {
        Cond::And(parts) => Cond::And(dedup_parts(parts)),
        Cond::Or(parts) => Cond::Or(dedup_parts(parts)),
        Cond::When(pre, eff) => {
            Cond::When(Box::new(deduplicate(*pre)), Box::new(deduplicate(*eff)))
        }
        leaf => leaf,
    }
}

fn dedup_parts(parts: Vec<Cond>) -> Vec<Cond> {
    let mut out: Vec<Cond> = Vec::with_capacity(parts.len());
    for part in parts.into_iter().map(deduplicate) {
        if let Cond::Atom(a) = &part {
            if out
                .iter()
                .any(|p| matches!(p, Cond::Atom(b) if a == b))
            {
                continue;
            }
        }
        out.push(part);
    }
    out
}

/// A conjunction holding both an atom and its negation can never be
/// satisfied; such preconditions become `false` (and vanish from any
/// enclosing disjunction through boolean absorption).
pub(crate) fn deconflict_pre(c: Cond) -> Cond {
    match c {
        Cond::And(parts) => {
            let parts: Vec<Cond> = parts.into_iter().map(deconflict_pre).collect();
            if conjunction_has_conflict(&parts) {
                return Cond::Bool(false);
            }
            if parts.iter().any(|p| matches!(p, Cond::Bool(false))) {
                return Cond::Bool(false);
            }
            Cond::And(parts)
        }
        Cond::Or(parts) => {
            let mut out: Vec<Cond> = Vec::new();
            for part in parts.into_iter().map(deconflict_pre) {
                if !matches!(part, Cond::Bool(false)) {
                    out.push(part);
                }
            }
            if out.is_empty() {
                Cond::Bool(false)
            } else if out.len() == 1 {
                out.pop().unwrap()
            } else {
                Cond::Or(out)
            }
        }
        leaf => leaf,
    }
}

fn conjunction_has_conflict(parts: &[Cond]) -> bool {
    for (i, p1) in parts.iter().enumerate() {
        let Cond::Atom(a1) = p1 else { continue };
        for p2 in parts.iter().skip(i + 1) {
            let Cond::Atom(a2) = p2 else { continue };
            if a1.pred == a2.pred && a1.args == a2.args && a1.neg != a2.neg {
                return true;
            }
        }
    }
    false
}

/// In an effect conjunction an add effect wins over a conflicting delete.
pub(crate) fn deconflict_eff(c: Cond) -> Cond {
    match c {
        Cond::And(parts) => {
            let parts: Vec<Cond> = parts.into_iter().map(deconflict_eff).collect();
            let mut out: Vec<Cond> = Vec::with_capacity(parts.len());
            for part in parts {
                if let Cond::Atom(a) = &part {
                    if a.neg
                        && out.iter().any(|p| {
                            matches!(p, Cond::Atom(b)
                                if !b.neg && b.pred == a.pred && b.args == a.args)
                        })
                    {
                        continue;
                    }
                    if !a.neg {
                        out.retain(|p| {
                            !matches!(p, Cond::Atom(b)
                                if b.neg && b.pred == a.pred && b.args == a.args)
                        });
                    }
                }
                out.push(part);
            }
            Cond::And(out)
        }
        Cond::When(pre, eff) => Cond::When(pre, Box::new(deconflict_eff(*eff))),
        leaf => leaf,
    }
}

/// Normalises an action in place: both trees are rewritten, the roots are
/// forced to conjunctions, and object-bound equalities are propagated.
pub(crate) fn normalize_action(action: &mut Action, env: &NormEnv) -> Result<()> {
    let pre = std::mem::replace(&mut action.pre, Cond::TRUE);
    let eff = std::mem::replace(&mut action.eff, Cond::TRUE);
    action.pre = normalize_cond(pre, env, &action.params)?;
    action.eff = normalize_cond(eff, env, &action.params)?;

    if matches!(action.pre, Cond::Bool(true)) {
        action.pre = Cond::And(Vec::new());
    }
    if matches!(action.pre, Cond::Atom(_)) {
        let atom = std::mem::replace(&mut action.pre, Cond::TRUE);
        action.pre = Cond::And(vec![atom]);
    }
    if matches!(
        action.eff,
        Cond::Atom(_) | Cond::Assign(_) | Cond::Increase(_) | Cond::When(..)
    ) {
        let eff = std::mem::replace(&mut action.eff, Cond::TRUE);
        action.eff = Cond::And(vec![eff]);
    }

    propagate_equality(action, env.preds);
    Ok(())
}

/// Splits an action whose precondition is a disjunction into one action per
/// disjunct. The returned actions replace the input.
pub(crate) fn split_action(action: Action, env: &NormEnv) -> Result<Vec<Action>> {
    let Cond::Or(choices) = &action.pre else {
        return Ok(vec![action]);
    };
    let choices = choices.clone();
    let mut out = Vec::with_capacity(choices.len());
    for choice in choices {
        let mut split = action.clone();
        split.pre = choice;
        normalize_action(&mut split, env)?;
        out.push(split);
    }
    Ok(out)
}

/// Substitutes `param := obj` for every positive `(= ?p obj)` found in the
/// precondition conjunction. The equality atom itself is left untouched so
/// grounding still pins the parameter to the object.
fn propagate_equality(action: &mut Action, preds: &Predicates) {
    let Some(eq) = preds.eq_pred else { return };
    if !matches!(action.pre, Cond::And(_) | Cond::Atom(_)) {
        return;
    }

    loop {
        let mut binding: Option<(usize, ObjId)> = None;
        let Cond::And(parts) = &action.pre else { break };
        'search: for part in parts {
            let Cond::Atom(a) = part else { continue };
            if a.pred != eq || a.neg {
                continue;
            }
            for (i, j) in [(0, 1), (1, 0)] {
                if let (Some(p), Some(o)) = (a.args[i].param(), a.args[j].obj()) {
                    if param_occurs_outside_eq(action, eq, p) {
                        binding = Some((p, o));
                        break 'search;
                    }
                }
            }
        }
        let Some((param, obj)) = binding else { break };
        substitute_outside_eq(&mut action.pre, eq, param, obj);
        substitute_outside_eq(&mut action.eff, eq, param, obj);
    }
}

fn param_occurs_outside_eq(action: &Action, eq: PredId, param: usize) -> bool {
    let mut found = false;
    let mut check = |a: &CondAtom| {
        if a.pred != eq && a.args.iter().any(|arg| arg.param() == Some(param)) {
            found = true;
        }
    };
    action.pre.visit_atoms(&mut check);
    action.eff.visit_atoms(&mut check);
    found
}

fn substitute_outside_eq(c: &mut Cond, eq: PredId, param: usize, obj: ObjId) {
    match c {
        Cond::And(parts) | Cond::Or(parts) => {
            for part in parts {
                substitute_outside_eq(part, eq, param, obj);
            }
        }
        Cond::Forall(_, body) | Cond::Exists(_, body) => {
            substitute_outside_eq(body, eq, param, obj)
        }
        Cond::When(pre, eff) => {
            substitute_outside_eq(pre, eq, param, obj);
            substitute_outside_eq(eff, eq, param, obj);
        }
        Cond::Imply(l, r) => {
            substitute_outside_eq(l, eq, param, obj);
            substitute_outside_eq(r, eq, param, obj);
        }
        Cond::Atom(a) if a.pred != eq => {
            for arg in a.args.iter_mut() {
                if *arg == CondArg::Param(param) {
                    *arg = CondArg::Obj(obj);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pddl::{Name, Param, OBJECT_TYPE};
    use smallvec::smallvec;

    fn env_fixture() -> (Types, Predicates, InitIndex) {
        let mut types = Types::default();
        let thing = types.add(Name::new("thing"), OBJECT_TYPE);
        types.add_object(0, thing).unwrap();
        types.add_object(1, thing).unwrap();
        types.seal();

        let mut preds = Predicates::default();
        preds.add_eq(OBJECT_TYPE);
        let clean = preds.add(Name::new("clean"), vec![thing]);
        let fixed = preds.add(Name::new("fixed"), vec![thing]);
        preds.get_mut(clean).write = true;
        // `fixed` stays static
        let _ = fixed;

        let mut init = InitIndex::default();
        init.insert(&CondAtom::new(fixed, smallvec![CondArg::Obj(0)]));

        (types, preds, init)
    }

    fn atom(pred: PredId, args: &[CondArg]) -> Cond {
        Cond::Atom(CondAtom::new(pred, args.iter().copied().collect()))
    }

    #[test]
    fn forall_expands_over_the_extent() {
        let (types, preds, init) = env_fixture();
        let env = NormEnv {
            types: &types,
            preds: &preds,
            init: &init,
            eval_static: true,
        };
        let params = vec![Param::new(Name::new("?x"), types.find("thing").unwrap())];
        let clean = preds.find("clean").unwrap();
        let c = Cond::Forall(0, Box::new(atom(clean, &[CondArg::Param(0)])));
        let n = normalize_cond(c, &env, &params).unwrap();
        assert_eq!(
            n,
            Cond::And(vec![
                atom(clean, &[CondArg::Obj(0)]),
                atom(clean, &[CondArg::Obj(1)]),
            ])
        );
    }

    #[test]
    fn forall_with_empty_extent_is_true() {
        let (mut types, preds, init) = env_fixture();
        let empty = types.add(Name::new("nothing"), OBJECT_TYPE);
        types.seal();
        let env = NormEnv {
            types: &types,
            preds: &preds,
            init: &init,
            eval_static: true,
        };
        let params = vec![Param::new(Name::new("?x"), empty)];
        let clean = preds.find("clean").unwrap();
        let c = Cond::Forall(0, Box::new(atom(clean, &[CondArg::Param(0)])));
        assert_eq!(normalize_cond(c, &env, &params).unwrap(), Cond::Bool(true));
    }

    #[test]
    fn static_atoms_evaluate_against_init() {
        let (types, preds, init) = env_fixture();
        let env = NormEnv {
            types: &types,
            preds: &preds,
            init: &init,
            eval_static: true,
        };
        let fixed = preds.find("fixed").unwrap();
        let clean = preds.find("clean").unwrap();

        let c = Cond::And(vec![
            atom(fixed, &[CondArg::Obj(0)]),
            atom(clean, &[CondArg::Param(0)]),
        ]);
        let n = normalize_cond(c, &env, &Vec::new()).unwrap();
        // the satisfied static atom disappears; the non-static one stays
        assert_eq!(n, atom(clean, &[CondArg::Param(0)]));

        let c = atom(fixed, &[CondArg::Obj(1)]);
        assert_eq!(normalize_cond(c, &env, &Vec::new()).unwrap(), Cond::Bool(false));
    }

    #[test]
    fn negative_partial_static_atom_with_no_match_holds() {
        let (types, mut preds, init) = env_fixture();
        let never = preds.add(Name::new("never"), vec![OBJECT_TYPE]);
        let env = NormEnv {
            types: &types,
            preds: &preds,
            init: &init,
            eval_static: true,
        };
        let mut a = CondAtom::new(never, smallvec![CondArg::Param(0)]);
        a.neg = true;
        assert_eq!(
            normalize_cond(Cond::Atom(a), &env, &Vec::new()).unwrap(),
            Cond::Bool(true)
        );
    }

    #[test]
    fn imply_becomes_disjunction_and_dnf_lifts_it() {
        let (types, preds, init) = env_fixture();
        let env = NormEnv {
            types: &types,
            preds: &preds,
            init: &init,
            eval_static: true,
        };
        let clean = preds.find("clean").unwrap();
        let p0 = atom(clean, &[CondArg::Obj(0)]);
        let p1 = atom(clean, &[CondArg::Obj(1)]);
        let c = Cond::And(vec![
            p0.clone(),
            Cond::Imply(Box::new(p0.clone()), Box::new(p1.clone())),
        ]);
        let n = normalize_cond(c, &env, &Vec::new()).unwrap();
        let not_p0 = p0.negate().unwrap();
        assert_eq!(
            n,
            Cond::Or(vec![
                Cond::And(vec![p0.clone(), not_p0]),
                Cond::And(vec![p0, p1]),
            ])
        );
    }

    #[test]
    fn conflicting_conjunction_is_false() {
        let (types, preds, _) = env_fixture();
        let clean = preds.find("clean").unwrap();
        let p = CondAtom::new(clean, smallvec![CondArg::Obj(0)]);
        let mut np = p.clone();
        np.neg = true;
        let c = Cond::And(vec![Cond::Atom(p), Cond::Atom(np)]);
        assert_eq!(deconflict_pre(c), Cond::Bool(false));
        let _ = types;
    }

    #[test]
    fn normalizing_twice_is_a_fixed_point() {
        let (types, preds, init) = env_fixture();
        let env = NormEnv {
            types: &types,
            preds: &preds,
            init: &init,
            eval_static: true,
        };
        let clean = preds.find("clean").unwrap();
        let c = Cond::And(vec![
            Cond::Or(vec![
                atom(clean, &[CondArg::Obj(0)]),
                atom(clean, &[CondArg::Obj(1)]),
            ]),
            atom(clean, &[CondArg::Param(0)]),
        ]);
        let once = normalize_cond(c, &env, &Vec::new()).unwrap();
        let twice = normalize_cond(once.clone(), &env, &Vec::new()).unwrap();
        assert_eq!(once, twice);
    }
}
