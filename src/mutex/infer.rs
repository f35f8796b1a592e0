//! Inference of lifted mutex groups. Candidates are tested against three
//! oracles (initial-state heaviness, action heaviness, action balance) and
//! refined on failure by restricting types, demoting counted variables, or
//! extending the conjunction with a balancing delete effect.

use crate::mutex::lifted_mgroup::{can_unify_fact, unify_fact};
use crate::mutex::{LiftedMGroup, LiftedMGroups};
use crate::pddl::{
    Action, Cond, CondArg, CondAtom, ObjId, Param, Params, Pddl, PredId, TypeId,
};
use std::collections::{HashMap, VecDeque};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct InferLimits {
    pub max_candidates: usize,
    pub max_mgroups: usize,
}

impl Default for InferLimits {
    fn default() -> Self {
        Self {
            max_candidates: 10_000,
            max_mgroups: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cfg {
    max_counted_vars: usize,
    refine_type: bool,
    refine_var: bool,
    refine_extend: bool,
    refine_proved: bool,
}

impl Cfg {
    fn fam_group() -> Self {
        Self {
            max_counted_vars: usize::MAX,
            refine_type: true,
            refine_var: true,
            refine_extend: true,
            refine_proved: true,
        }
    }

    fn monotonicity() -> Self {
        Self {
            max_counted_vars: 1,
            refine_type: false,
            refine_var: false,
            refine_extend: false,
            refine_proved: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Cand {
    mgroup: LiftedMGroup,
    each_pred_only_once: bool,
}

struct Refine<'a> {
    pddl: &'a Pddl,
    limits: InferLimits,
    cfg: Cfg,
    table: HashMap<LiftedMGroup, usize>,
    cands: Vec<Cand>,
    /// Extension refinements are explored before type/variable ones.
    queue1: VecDeque<usize>,
    queue2: VecDeque<usize>,
}

impl<'a> Refine<'a> {
    fn new(pddl: &'a Pddl, limits: InferLimits, cfg: Cfg) -> Self {
        Self {
            pddl,
            limits,
            cfg,
            table: HashMap::new(),
            cands: Vec::new(),
            queue1: VecDeque::new(),
            queue2: VecDeque::new(),
        }
    }

    fn next(&mut self) -> Option<Cand> {
        let id = self.queue1.pop_front().or_else(|| self.queue2.pop_front())?;
        Some(self.cands[id].clone())
    }

    fn has_work(&self) -> bool {
        !self.queue1.is_empty() || !self.queue2.is_empty()
    }

    fn add_cand(&mut self, mg: LiftedMGroup, fast_queue: bool) {
        if self.cands.len() >= self.limits.max_candidates {
            return;
        }
        if self.table.contains_key(&mg) {
            return;
        }
        let id = self.cands.len();
        self.table.insert(mg.clone(), id);
        let each_pred_only_once = {
            let mut preds: Vec<PredId> = mg.atoms.iter().map(|a| a.pred).collect();
            let before = preds.len();
            preds.sort_unstable();
            preds.dedup();
            preds.len() == before
        };
        self.cands.push(Cand {
            mgroup: mg,
            each_pred_only_once,
        });
        if fast_queue {
            self.queue1.push_back(id);
        } else {
            self.queue2.push_back(id);
        }
    }
}

/* ----- naming contexts for action unification -----
 *
 * Bindings range over objects (ids below the object count) and fresh
 * "names" (ids from the object count upwards) that stand for
 * not-yet-instantiated action arguments forced to be equal. */

#[derive(Debug, Clone)]
struct UnifyCtx {
    action_arg: Vec<Option<usize>>,
    cand_arg: Vec<Option<usize>>,
    next_name: usize,
}

impl UnifyCtx {
    fn new(pddl: &Pddl, action_params: &Params, cand_params: &Params) -> Self {
        let seed = |params: &Params| {
            params
                .iter()
                .map(|p| {
                    if pddl.types.num_objs(p.type_) == 1 {
                        Some(pddl.types.objs_by_type(p.type_)[0])
                    } else {
                        None
                    }
                })
                .collect()
        };
        Self {
            action_arg: seed(action_params),
            cand_arg: seed(cand_params),
            next_name: pddl.objects.len(),
        }
    }

    fn rename(&mut self, from: usize, to: usize) {
        for slot in self.cand_arg.iter_mut().chain(self.action_arg.iter_mut()) {
            if *slot == Some(from) {
                *slot = Some(to);
            }
        }
    }
}

fn atoms_are_compatible(
    pddl: &Pddl,
    a1: &CondAtom,
    a1_params: &Params,
    a2: &CondAtom,
    a2_params: &Params,
) -> bool {
    if a1.pred != a2.pred {
        return false;
    }
    for i in 0..a1.args.len() {
        match (a1.args[i], a2.args[i]) {
            (CondArg::Param(p1), CondArg::Param(p2)) => {
                if pddl
                    .types
                    .are_disjoint(a1_params[p1].type_, a2_params[p2].type_)
                {
                    return false;
                }
            }
            (CondArg::Param(p1), CondArg::Obj(o2)) => {
                if !pddl.types.obj_has_type(a1_params[p1].type_, o2) {
                    return false;
                }
            }
            (CondArg::Obj(o1), CondArg::Param(p2)) => {
                if !pddl.types.obj_has_type(a2_params[p2].type_, o1) {
                    return false;
                }
            }
            (CondArg::Obj(o1), CondArg::Obj(o2)) => {
                if o1 != o2 {
                    return false;
                }
            }
        }
    }
    true
}

/// Unifies an action atom with a candidate atom, assigning shared names to
/// action arguments and candidate parameters.
fn unify_action_atom(
    ctx: &mut UnifyCtx,
    pddl: &Pddl,
    action_params: &Params,
    cand: &LiftedMGroup,
    action_atom: &CondAtom,
    cand_atom: &CondAtom,
) -> bool {
    if !atoms_are_compatible(pddl, cand_atom, &cand.params, action_atom, action_params) {
        return false;
    }

    // counted variables may rebind
    for arg in &cand_atom.args {
        if let Some(p) = arg.param() {
            if cand.params[p].is_counted_var {
                ctx.cand_arg[p] = None;
            }
        }
    }

    let num_objs = pddl.objects.len();
    for i in 0..cand_atom.args.len() {
        match (action_atom.args[i], cand_atom.args[i]) {
            (CondArg::Param(ap), CondArg::Param(cp)) => {
                match (ctx.cand_arg[cp], ctx.action_arg[ap]) {
                    (None, None) => {
                        ctx.cand_arg[cp] = Some(ctx.next_name);
                        ctx.action_arg[ap] = Some(ctx.next_name);
                        ctx.next_name += 1;
                    }
                    (None, Some(a)) => ctx.cand_arg[cp] = Some(a),
                    (Some(c), None) => ctx.action_arg[ap] = Some(c),
                    (Some(c), Some(a)) if c != a => {
                        if c < num_objs && a < num_objs {
                            return false;
                        } else if c < num_objs {
                            ctx.rename(a, c);
                        } else {
                            ctx.rename(c, a);
                        }
                    }
                    _ => {}
                }
            }
            (CondArg::Obj(obj), CondArg::Param(cp)) => match ctx.cand_arg[cp] {
                None => ctx.cand_arg[cp] = Some(obj),
                Some(c) if c < num_objs => {
                    if c != obj {
                        return false;
                    }
                }
                Some(c) => ctx.rename(c, obj),
            },
            (CondArg::Param(ap), CondArg::Obj(obj)) => match ctx.action_arg[ap] {
                None => ctx.action_arg[ap] = Some(obj),
                Some(a) if a < num_objs => {
                    if a != obj {
                        return false;
                    }
                }
                Some(a) => ctx.rename(a, obj),
            },
            (CondArg::Obj(o1), CondArg::Obj(o2)) => {
                if o1 != o2 {
                    return false;
                }
            }
        }
    }
    true
}

/* ----- resolution helpers over named bindings ----- */

fn resolve(arg: &CondArg, binding: &[Option<usize>]) -> Option<usize> {
    match arg {
        CondArg::Obj(o) => Some(*o),
        CondArg::Param(p) => binding[*p],
    }
}

fn atoms_equal_named(a1: &CondAtom, a2: &CondAtom, binding: &[Option<usize>]) -> bool {
    a1.pred == a2.pred
        && a1
            .args
            .iter()
            .zip(a2.args.iter())
            .all(|(x, y)| resolve(x, binding) == resolve(y, binding))
}

fn conj_atoms(c: &Cond) -> Vec<&CondAtom> {
    match c {
        Cond::Atom(a) => vec![a],
        Cond::And(parts) => parts
            .iter()
            .filter_map(|p| match p {
                Cond::Atom(a) => Some(a),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn equal_atom_in(atom: &CondAtom, conj: &Cond, binding: &[Option<usize>]) -> bool {
    conj_atoms(conj)
        .into_iter()
        .any(|c| !c.neg && atoms_equal_named(atom, c, binding))
}

/// Inequality preconditions rule out assigning one name to both sides.
fn inequalities_hold(pddl: &Pddl, pre: &Cond, binding: &[Option<usize>]) -> bool {
    for atom in conj_atoms(pre) {
        if !atom.neg || !pddl.preds.is_eq(atom.pred) {
            continue;
        }
        let (a, b) = (resolve(&atom.args[0], binding), resolve(&atom.args[1], binding));
        if let (Some(a), Some(b)) = (a, b) {
            if a == b {
                return false;
            }
        }
    }
    true
}

/// Two action parameters bound to the same name must not have disjoint
/// types.
fn action_arg_types_are_valid(pddl: &Pddl, params: &Params, binding: &[Option<usize>]) -> bool {
    for i in 0..params.len() {
        let Some(v1) = binding[i] else { continue };
        for j in i + 1..params.len() {
            if binding[j] == Some(v1)
                && pddl.types.are_disjoint(params[i].type_, params[j].type_)
            {
                return false;
            }
        }
    }
    true
}

/// Static positive preconditions fully bound to objects must appear in the
/// initial state.
fn static_pre_hold(pddl: &Pddl, pre: &Cond, binding: &[Option<usize>]) -> bool {
    let num_objs = pddl.objects.len();
    for atom in conj_atoms(pre) {
        if atom.neg || pddl.preds.is_eq(atom.pred) || !pddl.preds.get(atom.pred).is_static() {
            continue;
        }
        let objs: Option<Vec<ObjId>> = atom
            .args
            .iter()
            .map(|a| resolve(a, binding).filter(|&v| v < num_objs))
            .collect();
        let Some(objs) = objs else { continue };
        let found = pddl.init_atoms().any(|init| {
            init.pred == atom.pred
                && init
                    .args
                    .iter()
                    .zip(objs.iter())
                    .all(|(arg, &obj)| arg.obj() == Some(obj))
        });
        if !found {
            return false;
        }
    }
    true
}

/* ----- effect iteration ----- */

struct CeAtom<'a> {
    pre: Option<&'a Cond>,
    atom: &'a CondAtom,
}

fn add_effects(action: &Action) -> Vec<CeAtom<'_>> {
    action
        .eff
        .add_effects()
        .into_iter()
        .map(|e| CeAtom {
            pre: e.when_pre,
            atom: e.atom,
        })
        .collect()
}

fn del_effects(action: &Action) -> Vec<CeAtom<'_>> {
    action
        .eff
        .del_effects()
        .into_iter()
        .map(|e| CeAtom {
            pre: e.when_pre,
            atom: e.atom,
        })
        .collect()
}

fn eff_pre_holds(pddl: &Pddl, eff: &CeAtom<'_>, binding: &[Option<usize>]) -> bool {
    eff.pre
        .map(|pre| inequalities_hold(pddl, pre, binding) && static_pre_hold(pddl, pre, binding))
        .unwrap_or(true)
}

fn eff_equal_atom_in(atom: &CondAtom, eff: &CeAtom<'_>, binding: &[Option<usize>]) -> bool {
    eff.pre
        .map(|pre| equal_atom_in(atom, pre, binding))
        .unwrap_or(false)
}

/* ----- heaviness oracles ----- */

/// 0: the initial state covers no atom; 1: exactly one; 2: at least two
/// (too heavy). On 2, the offending pair is handed to refinement.
fn init_heaviness(pddl: &Pddl, cand: &Cand, mut refine: Option<&mut Refine>) -> usize {
    let init: Vec<&CondAtom> = pddl.init_atoms().collect();
    let mut arg = vec![None; cand.mgroup.params.len()];
    let mut unified = 0;

    for (i, a1) in init.iter().enumerate() {
        for cand1 in &cand.mgroup.atoms {
            if cand1.pred != a1.pred {
                continue;
            }
            if !unify_fact(&pddl.types, a1, None, &cand.mgroup.params, cand1, &mut arg) {
                continue;
            }
            unified = 1;

            for a2 in init.iter().skip(i + 1) {
                for cand2 in &cand.mgroup.atoms {
                    if cand2.pred != a2.pred {
                        continue;
                    }
                    if can_unify_fact(&pddl.types, a2, None, &cand.mgroup.params, cand2, &arg) {
                        if let Some(refine) = refine.as_deref_mut() {
                            refine_too_heavy(refine, None, a1, a2, cand, cand1, cand2);
                        }
                        return 2;
                    }
                }
            }
        }
    }
    unified
}

fn is_init_exactly_one(pddl: &Pddl, cand: &Cand, refine: Option<&mut Refine>) -> bool {
    init_heaviness(pddl, cand, refine) == 1
}

fn is_init_too_heavy(pddl: &Pddl, cand: &Cand, refine: Option<&mut Refine>) -> bool {
    init_heaviness(pddl, cand, refine) > 1
}

/// Does the action produce two distinct covered atoms under a consistent
/// binding?
fn is_action_too_heavy(
    cand: &Cand,
    pddl: &Pddl,
    action: &Action,
    mut refine: Option<&mut Refine>,
) -> bool {
    let adds = add_effects(action);
    for (i, e1) in adds.iter().enumerate() {
        for cand1 in &cand.mgroup.atoms {
            if cand1.pred != e1.atom.pred {
                continue;
            }
            let mut ctx = UnifyCtx::new(pddl, &action.params, &cand.mgroup.params);
            if !unify_action_atom(&mut ctx, pddl, &action.params, &cand.mgroup, e1.atom, cand1)
            {
                continue;
            }

            for e2 in adds.iter().skip(i + 1) {
                if cand.each_pred_only_once
                    && e2.atom.pred == e1.atom.pred
                    && !cand.mgroup.atom_has_counted_var(cand1)
                {
                    continue;
                }
                for cand2 in &cand.mgroup.atoms {
                    if cand2.pred != e2.atom.pred {
                        continue;
                    }
                    let mut ctx2 = ctx.clone();
                    if !unify_action_atom(
                        &mut ctx2,
                        pddl,
                        &action.params,
                        &cand.mgroup,
                        e2.atom,
                        cand2,
                    ) {
                        continue;
                    }
                    if check_unified_eff_pair(&ctx2, pddl, action, e1, e2) {
                        if let Some(refine) = refine.as_deref_mut() {
                            refine_too_heavy(
                                refine,
                                Some(&action.params),
                                e1.atom,
                                e2.atom,
                                cand,
                                cand1,
                                cand2,
                            );
                        }
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn check_unified_eff_pair(
    ctx: &UnifyCtx,
    pddl: &Pddl,
    action: &Action,
    e1: &CeAtom<'_>,
    e2: &CeAtom<'_>,
) -> bool {
    if !action_arg_types_are_valid(pddl, &action.params, &ctx.action_arg) {
        return false;
    }
    if !inequalities_hold(pddl, &action.pre, &ctx.action_arg)
        || !eff_pre_holds(pddl, e1, &ctx.action_arg)
        || !eff_pre_holds(pddl, e2, &ctx.action_arg)
    {
        return false;
    }
    // the two unified effects must actually differ
    if atoms_equal_named(e1.atom, e2.atom, &ctx.action_arg) {
        return false;
    }
    // an effect whose atom is already required cannot increase the count
    if equal_atom_in(e1.atom, &action.pre, &ctx.action_arg)
        || eff_equal_atom_in(e1.atom, e1, &ctx.action_arg)
        || equal_atom_in(e2.atom, &action.pre, &ctx.action_arg)
        || eff_equal_atom_in(e2.atom, e2, &ctx.action_arg)
    {
        return false;
    }
    if !static_pre_hold(pddl, &action.pre, &ctx.action_arg) {
        return false;
    }
    true
}

fn is_any_action_too_heavy(
    pddl: &Pddl,
    cand: &Cand,
    mut refine: Option<&mut Refine>,
) -> bool {
    pddl.actions
        .iter()
        .any(|a| is_action_too_heavy(cand, pddl, a, refine.as_deref_mut()))
}

/* ----- balance oracle ----- */

fn unify_action_eff(
    ctx: &mut UnifyCtx,
    pddl: &Pddl,
    action: &Action,
    eff: &CeAtom<'_>,
    cand: &LiftedMGroup,
    cand_atom: &CondAtom,
) -> bool {
    unify_action_atom(ctx, pddl, &action.params, cand, eff.atom, cand_atom)
        && action_arg_types_are_valid(pddl, &action.params, &ctx.action_arg)
        && inequalities_hold(pddl, &action.pre, &ctx.action_arg)
        && eff.pre
            .map(|p| inequalities_hold(pddl, p, &ctx.action_arg))
            .unwrap_or(true)
}

/// Whether the delete effect can be unified with the candidate atom under
/// the binding of the add effect it should balance. With
/// `need_matching_pre` the deleted atom must provably hold beforehand.
fn can_unify_eff(
    ctx_in: &UnifyCtx,
    pddl: &Pddl,
    action: &Action,
    eff: &CeAtom<'_>,
    cand: &LiftedMGroup,
    cand_atom: &CondAtom,
    need_matching_pre: bool,
) -> bool {
    if !atoms_are_compatible(pddl, cand_atom, &cand.params, eff.atom, &action.params) {
        return false;
    }

    let mut ctx = ctx_in.clone();
    for (p, param) in cand.params.iter().enumerate() {
        if param.is_counted_var {
            ctx.cand_arg[p] = None;
        }
    }

    for i in 0..cand_atom.args.len() {
        match (cand_atom.args[i], eff.atom.args[i]) {
            (CondArg::Param(cp), CondArg::Param(dp)) => {
                if cand.params[cp].is_counted_var {
                    // the candidate type must not be narrower than the
                    // delete effect's argument type
                    let dtype = action.params[dp].type_;
                    let ctype = cand.params[cp].type_;
                    if dtype != ctype && pddl.types.is_parent(ctype, dtype) {
                        return false;
                    }
                    if ctx.action_arg[dp].is_none() {
                        ctx.action_arg[dp] = Some(ctx.next_name);
                        ctx.next_name += 1;
                    }
                    ctx.cand_arg[cp] = ctx.action_arg[dp];
                } else {
                    if ctx.action_arg[dp].is_none() || ctx.cand_arg[cp] != ctx.action_arg[dp] {
                        return false;
                    }
                }
            }
            (CondArg::Param(cp), CondArg::Obj(dobj)) => {
                if cand.params[cp].is_counted_var {
                    if !pddl.types.obj_has_type(cand.params[cp].type_, dobj) {
                        return false;
                    }
                    ctx.cand_arg[cp] = Some(dobj);
                } else if ctx.cand_arg[cp] != Some(dobj) {
                    return false;
                }
            }
            (CondArg::Obj(cobj), CondArg::Param(dp)) => {
                if ctx.action_arg[dp] != Some(cobj) {
                    return false;
                }
            }
            (CondArg::Obj(cobj), CondArg::Obj(dobj)) => {
                if cobj != dobj {
                    return false;
                }
            }
        }
    }

    if need_matching_pre {
        equal_atom_in(eff.atom, &action.pre, &ctx.action_arg)
            || eff_equal_atom_in(eff.atom, eff, &ctx.action_arg)
    } else {
        true
    }
}

fn is_add_eff_balanced(
    ctx: &UnifyCtx,
    pddl: &Pddl,
    action: &Action,
    add_eff: &CeAtom<'_>,
    cand: &Cand,
) -> bool {
    for del_eff in del_effects(action) {
        // only delete effects sharing the add effect's condition balance it
        if !same_when_pre(add_eff, &del_eff) {
            continue;
        }
        for cand_atom in &cand.mgroup.atoms {
            if cand_atom.pred != del_eff.atom.pred {
                continue;
            }
            if can_unify_eff(ctx, pddl, action, &del_eff, &cand.mgroup, cand_atom, true) {
                return true;
            }
        }
    }
    false
}

fn same_when_pre(a: &CeAtom<'_>, b: &CeAtom<'_>) -> bool {
    match (a.pre, b.pre) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn is_action_balanced(
    cand: &Cand,
    pddl: &Pddl,
    action: &Action,
    mut refine: Option<&mut Refine>,
) -> bool {
    for add_eff in add_effects(action) {
        for cand_atom in &cand.mgroup.atoms {
            if cand_atom.pred != add_eff.atom.pred {
                continue;
            }
            let mut ctx = UnifyCtx::new(pddl, &action.params, &cand.mgroup.params);
            if unify_action_eff(&mut ctx, pddl, action, &add_eff, &cand.mgroup, cand_atom) {
                if !is_add_eff_balanced(&ctx, pddl, action, &add_eff, cand) {
                    if let Some(refine) = refine.as_deref_mut() {
                        refine_unbalanced(refine, &ctx, action, add_eff.atom, cand, cand_atom);
                    }
                    return false;
                }
            }
        }
    }
    true
}

fn is_any_action_unbalanced(
    pddl: &Pddl,
    cand: &Cand,
    mut refine: Option<&mut Refine>,
) -> bool {
    pddl.actions
        .iter()
        .any(|a| !is_action_balanced(cand, pddl, a, refine.as_deref_mut()))
}

/* ----- goal awareness ----- */

fn is_goal_aware(pddl: &Pddl, mg: &LiftedMGroup) -> bool {
    let Ok(goal_atoms) = pddl.goal.conjunction_atoms() else {
        return false;
    };
    let mut arg = vec![None; mg.params.len()];
    for goal in goal_atoms {
        if goal.neg {
            continue;
        }
        for c in &mg.atoms {
            if c.pred == goal.pred
                && unify_fact(&pddl.types, goal, None, &mg.params, c, &mut arg)
            {
                return true;
            }
        }
    }
    false
}

/* ----- refinement ----- */

fn restrict_param_types(pddl: &Pddl, mg: &mut LiftedMGroup) {
    for atom in &mg.atoms.clone() {
        let pred_types = &pddl.preds.get(atom.pred).param_types;
        for (i, arg) in atom.args.iter().enumerate() {
            let Some(p) = arg.param() else { continue };
            let mg_type = mg.params[p].type_;
            let pred_type = pred_types[i];
            if pred_type != mg_type && pddl.types.is_parent(mg_type, pred_type) {
                mg.params[p].type_ = pred_type;
            }
        }
    }
}

fn add_candidate_with_param_type(refine: &mut Refine, cand: &Cand, param: usize, type_: TypeId) {
    let mut mg = cand.mgroup.clone();
    mg.params[param].type_ = type_;
    mg.sort();
    refine.add_cand(mg, false);
}

fn refine_param_types_tree(
    refine: &mut Refine,
    cand: &Cand,
    param: usize,
    cand_type: TypeId,
    atom_type: TypeId,
    atom_parent_type: TypeId,
) {
    let children = refine.pddl.types.get(atom_parent_type).children.clone();
    for tid in children {
        if tid == atom_type {
            continue;
        }
        add_candidate_with_param_type(refine, cand, param, tid);
    }
    if atom_parent_type != cand_type {
        if let Some(parent) = refine.pddl.types.get(atom_parent_type).parent {
            refine_param_types_tree(refine, cand, param, cand_type, atom_parent_type, parent);
        }
    }
}

fn refine_param_types(
    refine: &mut Refine,
    cand: &Cand,
    param: usize,
    cand_type: TypeId,
    atom_type: TypeId,
) {
    if cand_type == atom_type {
        return;
    }
    let types = &refine.pddl.types;
    if types.is_either(cand_type) {
        for tid in types.get(cand_type).either.clone() {
            refine_param_types(refine, cand, param, tid, atom_type);
        }
        return;
    }
    if types.is_either(atom_type) {
        for tid in types.get(atom_type).either.clone() {
            refine_param_types(refine, cand, param, cand_type, tid);
        }
        return;
    }
    if !types.is_parent(atom_type, cand_type) {
        add_candidate_with_param_type(refine, cand, param, cand_type);
        return;
    }
    if let Some(parent) = types.get(atom_type).parent {
        refine_param_types_tree(refine, cand, param, cand_type, atom_type, parent);
    }
}

/// Restricts the type of a candidate parameter to a subtype disjoint from
/// the offending atom's argument type.
fn refine_types(
    refine: &mut Refine,
    params: Option<&Params>,
    atom: &CondAtom,
    cand: &Cand,
    cand_atom: &CondAtom,
) {
    if refine.cands.len() >= refine.limits.max_candidates {
        return;
    }
    for (i, cand_arg) in cand_atom.args.iter().enumerate() {
        let Some(cparam) = cand_arg.param() else {
            continue;
        };
        let pred_type = refine.pddl.preds.get(atom.pred).param_types[i];
        let mut ctype = cand.mgroup.params[cparam].type_;
        if pred_type != ctype && refine.pddl.types.is_parent(ctype, pred_type) {
            ctype = pred_type;
        }

        let atype = match atom.args[i] {
            CondArg::Param(ap) => params.map(|ps| ps[ap].type_),
            CondArg::Obj(obj) => Some(refine.pddl.objects.get(obj).type_),
        };
        let Some(atype) = atype else { continue };

        if atype != ctype {
            refine_param_types(refine, cand, cparam, ctype, atype);
        }
        if let CondArg::Obj(obj) = atom.args[i] {
            for tid in refine.pddl.types.get(atype).children.clone() {
                if !refine.pddl.types.obj_has_type(tid, obj) {
                    add_candidate_with_param_type(refine, cand, cparam, tid);
                }
            }
        }
    }
}

/// Demotes a counted variable shared by both offending atoms to a fixed
/// variable.
fn refine_variables(
    refine: &mut Refine,
    a1: &CondAtom,
    a2: &CondAtom,
    cand: &Cand,
    cand_atom1: &CondAtom,
    cand_atom2: &CondAtom,
) {
    if refine.cands.len() >= refine.limits.max_candidates {
        return;
    }
    let vars1 = cand.mgroup.counted_vars_of(cand_atom1);
    let vars2 = cand.mgroup.counted_vars_of(cand_atom2);
    for var in vars1.into_iter().filter(|v| vars2.contains(v)) {
        for (i1, c1) in cand_atom1.args.iter().enumerate() {
            if c1.param() != Some(var) {
                continue;
            }
            for (i2, c2) in cand_atom2.args.iter().enumerate() {
                if c2.param() != Some(var) {
                    continue;
                }
                if a1.args[i1] != a2.args[i2] {
                    let mut mg = cand.mgroup.clone();
                    mg.params[var].is_counted_var = false;
                    mg.sort();
                    refine.add_cand(mg, false);
                }
            }
        }
    }
}

fn refine_too_heavy(
    refine: &mut Refine,
    params: Option<&Params>,
    a1: &CondAtom,
    a2: &CondAtom,
    cand: &Cand,
    cand_atom1: &CondAtom,
    cand_atom2: &CondAtom,
) {
    if refine.cands.len() >= refine.limits.max_candidates {
        return;
    }
    if refine.cfg.refine_type {
        refine_types(refine, params, a1, cand, cand_atom1);
        refine_types(refine, params, a2, cand, cand_atom2);
    }
    if refine.cfg.refine_var {
        refine_variables(refine, a1, a2, cand, cand_atom1, cand_atom2);
    }
}

fn refine_unbalanced(
    refine: &mut Refine,
    ctx: &UnifyCtx,
    action: &Action,
    add_eff: &CondAtom,
    cand: &Cand,
    cand_add_eff: &CondAtom,
) {
    if refine.cands.len() >= refine.limits.max_candidates {
        return;
    }
    if refine.cfg.refine_extend {
        refine_extend(refine, ctx, action, cand);
    }
    if refine.cfg.refine_type {
        refine_types(refine, Some(&action.params), add_eff, cand, cand_add_eff);
    }
}

/// Extends the candidate with a delete-effect atom that could rebalance
/// the action.
fn refine_extend(refine: &mut Refine, ctx: &UnifyCtx, action: &Action, cand: &Cand) {
    if refine.cands.len() >= refine.limits.max_candidates {
        return;
    }
    for del_eff in del_effects(action) {
        if cand.mgroup.has_pred(del_eff.atom.pred) {
            continue;
        }
        let mut atom_params = vec![0isize; del_eff.atom.args.len()];
        refine_candidate_with_eff(
            refine,
            ctx,
            action,
            cand,
            &del_eff,
            &mut atom_params,
            0,
            true,
            0,
        );
    }
}

/// Enumerates how the new atom's argument slots map onto candidate
/// parameters (or fresh counted variables, marked -1).
#[allow(clippy::too_many_arguments)]
fn refine_candidate_with_eff(
    refine: &mut Refine,
    ctx: &UnifyCtx,
    action: &Action,
    cand: &Cand,
    atom: &CeAtom<'_>,
    atom_params: &mut Vec<isize>,
    argi: usize,
    pre_test: bool,
    num_counted: usize,
) {
    let max_counted = refine.cfg.max_counted_vars;
    if argi == atom.atom.args.len() {
        if !pre_test
            || equal_atom_in(atom.atom, &action.pre, &ctx.action_arg)
            || eff_equal_atom_in(atom.atom, atom, &ctx.action_arg)
        {
            add_refined_candidate(refine, cand, atom.atom, atom_params);
        }
        return;
    }

    match atom.atom.args[argi] {
        CondArg::Param(ap) if ctx.action_arg[ap].is_none() => {
            if num_counted < max_counted {
                atom_params[argi] = -1;
                let mut ctx2 = ctx.clone();
                ctx2.action_arg[ap] = Some(ctx2.next_name);
                ctx2.next_name += 1;
                refine_candidate_with_eff(
                    refine,
                    &ctx2,
                    action,
                    cand,
                    atom,
                    atom_params,
                    argi + 1,
                    pre_test,
                    num_counted + 1,
                );
            }
        }
        arg => {
            let value = match arg {
                CondArg::Obj(o) => Some(o),
                CondArg::Param(ap) => ctx.action_arg[ap],
            };
            for ci in 0..cand.mgroup.params.len() {
                if ctx.cand_arg[ci].is_some() && ctx.cand_arg[ci] == value {
                    atom_params[argi] = ci as isize;
                    refine_candidate_with_eff(
                        refine,
                        ctx,
                        action,
                        cand,
                        atom,
                        atom_params,
                        argi + 1,
                        pre_test,
                        num_counted,
                    );
                }
            }
            if num_counted < max_counted {
                atom_params[argi] = -1;
                refine_candidate_with_eff(
                    refine,
                    ctx,
                    action,
                    cand,
                    atom,
                    atom_params,
                    argi + 1,
                    pre_test,
                    num_counted + 1,
                );
            }
        }
    }
}

fn add_refined_candidate(
    refine: &mut Refine,
    cand: &Cand,
    atom: &CondAtom,
    atom_params: &[isize],
) {
    let mut mg = cand.mgroup.clone();
    let pred_types = refine.pddl.preds.get(atom.pred).param_types.clone();
    let mut args = smallvec::SmallVec::new();
    for (i, &ap) in atom_params.iter().enumerate() {
        if ap < 0 {
            let param_idx = mg.params.len();
            let mut param = Param::counted(pred_types[i]);
            param.is_counted_var = true;
            mg.params.push(param);
            args.push(CondArg::Param(param_idx));
        } else {
            let param_idx = ap as usize;
            let type_cand = mg.params[param_idx].type_;
            if refine.pddl.types.are_disjoint(type_cand, pred_types[i]) {
                return;
            }
            mg.params[param_idx].is_counted_var = false;
            args.push(CondArg::Param(param_idx));
        }
    }
    mg.atoms.push(CondAtom::new(atom.pred, args));
    restrict_param_types(refine.pddl, &mut mg);
    mg.sort();
    refine.add_cand(mg, true);
}

/* ----- refinement of proved candidates ----- */

fn add_proved(pddl: &Pddl, mg: &LiftedMGroup, out: &mut LiftedMGroups) {
    let mut m = mg.clone();
    m.replace_single_object_types(&pddl.types);
    m.sort();
    out.add(m);
}

fn refine_variables_proved(
    refine: &Refine,
    cand: &Cand,
    var: usize,
    out: &mut LiftedMGroups,
) {
    let mut var = var;
    while var < cand.mgroup.params.len() && !cand.mgroup.params[var].is_counted_var {
        var += 1;
    }
    if var == cand.mgroup.params.len() {
        if is_init_exactly_one(refine.pddl, cand, None)
            && !is_any_action_too_heavy(refine.pddl, cand, None)
            && !is_any_action_unbalanced(refine.pddl, cand, None)
            && is_goal_aware(refine.pddl, &cand.mgroup)
        {
            add_proved(refine.pddl, &cand.mgroup, out);
        }
        return;
    }

    let mut demoted = cand.clone();
    demoted.mgroup.params[var].is_counted_var = false;
    refine_variables_proved(refine, &demoted, var + 1, out);
    refine_variables_proved(refine, cand, var + 1, out);
}

/// A proved candidate spawns (a) goal-aware variants with counted
/// variables demoted and (b) extensions with add effects whose deletes the
/// group already covers.
fn refine_proved(refine: &mut Refine, cand: &Cand, out: &mut LiftedMGroups) {
    if refine.cfg.refine_proved {
        if is_goal_aware(refine.pddl, &cand.mgroup) && cand.mgroup.has_counted_var() {
            refine_variables_proved(refine, cand, 0, out);
        }
        for ai in 0..refine.pddl.actions.len() {
            refine_extend_proved(refine, ai, cand);
        }
    }
}

fn refine_extend_proved(refine: &mut Refine, action_idx: usize, cand: &Cand) {
    if refine.cands.len() >= refine.limits.max_candidates {
        return;
    }
    let pddl = refine.pddl;
    let action = &pddl.actions[action_idx];

    let has_add_eff_pred = add_effects(action)
        .iter()
        .any(|e| cand.mgroup.has_pred(e.atom.pred));
    if has_add_eff_pred {
        return;
    }

    for del_eff in del_effects(action) {
        for c in cand.mgroup.atoms.clone() {
            if c.pred != del_eff.atom.pred {
                continue;
            }
            let mut ctx = UnifyCtx::new(pddl, &action.params, &cand.mgroup.params);
            if unify_action_eff(&mut ctx, pddl, action, &del_eff, &cand.mgroup, &c)
                && (equal_atom_in(del_eff.atom, &action.pre, &ctx.action_arg)
                    || eff_equal_atom_in(del_eff.atom, &del_eff, &ctx.action_arg))
            {
                for add_eff in add_effects(action) {
                    let mut atom_params = vec![0isize; add_eff.atom.args.len()];
                    refine_candidate_with_eff(
                        refine,
                        &ctx,
                        action,
                        cand,
                        &add_eff,
                        &mut atom_params,
                        0,
                        false,
                        0,
                    );
                }
            }
        }
    }
}

/* ----- classification of proved groups ----- */

/// Sets `is_exactly_one` (every unifiable delete effect is balanced by an
/// add effect sharing its condition) and `is_static` (no delete effect
/// unifies at all) on the proved groups.
fn classify(pddl: &Pddl, mgroups: &mut LiftedMGroups) {
    for mg in &mut mgroups.groups {
        let cand = Cand {
            mgroup: mg.clone(),
            each_pred_only_once: true,
        };
        let mut any_delete = false;
        let mut every_delete_balanced = true;

        for action in &pddl.actions {
            for del_eff in del_effects(action) {
                for cand_atom in &cand.mgroup.atoms {
                    if cand_atom.pred != del_eff.atom.pred {
                        continue;
                    }
                    let mut ctx = UnifyCtx::new(pddl, &action.params, &cand.mgroup.params);
                    if !unify_action_eff(
                        &mut ctx,
                        pddl,
                        action,
                        &del_eff,
                        &cand.mgroup,
                        cand_atom,
                    ) {
                        continue;
                    }
                    any_delete = true;

                    let balanced = add_effects(action).iter().any(|add_eff| {
                        same_when_pre(add_eff, &del_eff)
                            && cand.mgroup.atoms.iter().any(|ca| {
                                ca.pred == add_eff.atom.pred
                                    && can_unify_eff(
                                        &ctx,
                                        pddl,
                                        action,
                                        add_eff,
                                        &cand.mgroup,
                                        ca,
                                        false,
                                    )
                            })
                    });
                    if !balanced {
                        every_delete_balanced = false;
                    }
                }
            }
        }

        mg.is_static = !any_delete;
        mg.is_exactly_one = is_init_exactly_one(pddl, &cand, None)
            && (mg.is_static || every_delete_balanced);
    }
}

/* ----- public entry points ----- */

/// Infers lifted fam-groups: candidates whose coverage the initial state
/// meets exactly once and that no action can overfill or unbalance.
pub fn infer_fam_groups(pddl: &Pddl, limits: &InferLimits) -> LiftedMGroups {
    info!("inference of lifted fam-groups started");
    let mut refine = Refine::new(pddl, *limits, Cfg::fam_group());
    let mut out = LiftedMGroups::default();

    initial_candidates_all_counted(pddl, &mut refine);

    let mut tested = 0usize;
    while refine.has_work() && out.len() < limits.max_mgroups {
        let Some(cand) = refine.next() else { break };
        if is_init_exactly_one(pddl, &cand, Some(&mut refine))
            && !is_any_action_too_heavy(pddl, &cand, Some(&mut refine))
            && !is_any_action_unbalanced(pddl, &cand, Some(&mut refine))
        {
            add_proved(pddl, &cand.mgroup, &mut out);
            refine_proved(&mut refine, &cand, &mut out);
        }
        tested += 1;
    }

    out.sort_and_uniq();
    classify(pddl, &mut out);
    info!(
        tested,
        candidates = refine.cands.len(),
        proved = out.len(),
        "inference of lifted fam-groups done"
    );
    out
}

/// Monotonicity-invariant inference seeded in the Fast-Downward style: at
/// most one counted variable per candidate, no refinement beyond partial
/// instantiation of init-heavy candidates.
pub fn infer_monotonicity(
    pddl: &Pddl,
    limits: &InferLimits,
    mut invariants: Option<&mut LiftedMGroups>,
) -> LiftedMGroups {
    info!("inference of monotonicity invariants started");
    let mut refine = Refine::new(pddl, *limits, Cfg::monotonicity());
    let mut out = LiftedMGroups::default();

    initial_candidates_fd(pddl, &mut refine);

    while refine.has_work() && out.len() < limits.max_mgroups {
        let Some(cand) = refine.next() else { break };
        if !is_any_action_too_heavy(pddl, &cand, None)
            && !is_any_action_unbalanced(pddl, &cand, None)
        {
            if let Some(inv) = invariants.as_deref_mut() {
                inv.add(cand.mgroup.clone());
            }
            if is_init_too_heavy(pddl, &cand, None) {
                remove_heaviness_by_instantiation(pddl, &cand, &mut out);
            } else if is_init_exactly_one(pddl, &cand, None) {
                add_proved(pddl, &cand.mgroup, &mut out);
            }
        }
    }

    if let Some(inv) = invariants.as_deref_mut() {
        inv.sort_and_uniq();
    }
    out.sort_and_uniq();
    classify(pddl, &mut out);
    info!(proved = out.len(), "inference of monotonicity invariants done");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn travel_location_predicate_is_an_exactly_one_fam_group() {
        let pddl = build_pddl(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        let groups = infer_fam_groups(&pddl, &InferLimits::default());

        let at = pddl.preds.find("at").unwrap();
        let group = groups
            .iter()
            .find(|g| g.atoms.len() == 1 && g.atoms[0].pred == at)
            .expect("the at-group is proved");
        assert_eq!(group.params.len(), 1);
        assert!(group.params[0].is_counted_var);
        assert!(group.is_exactly_one);
        assert!(!group.is_static);
    }

    #[test]
    fn dualmove_yields_one_exactly_one_group_per_agent_predicate() {
        let pddl = build_pddl(DUALMOVE_DOMAIN_TEXT, DUALMOVE_PROBLEM01_TEXT);
        let groups = infer_fam_groups(&pddl, &InferLimits::default());

        for pred_name in ["at1", "at2"] {
            let pred = pddl.preds.find(pred_name).unwrap();
            let group = groups
                .iter()
                .find(|g| g.atoms.len() == 1 && g.atoms[0].pred == pred)
                .unwrap_or_else(|| panic!("missing group for {}", pred_name));
            assert!(group.is_exactly_one);
        }
    }

    #[test]
    fn beacon_has_no_candidates() {
        // the only predicate is static, so nothing can alternate
        let pddl = build_pddl(BEACON_DOMAIN_TEXT, BEACON_PROBLEM01_TEXT);
        let groups = infer_fam_groups(&pddl, &InferLimits::default());
        assert!(groups.is_empty());
    }

    #[test]
    fn candidate_budget_caps_the_search() {
        let pddl = build_pddl(WORKSHOP_DOMAIN_TEXT, WORKSHOP_PROBLEM01_TEXT);
        let limits = InferLimits {
            max_candidates: 1,
            max_mgroups: 1,
        };
        let groups = infer_fam_groups(&pddl, &limits);
        assert!(groups.len() <= 1);
    }

    #[test]
    fn monotonicity_inference_finds_the_travel_group() {
        let pddl = build_pddl(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        let mut invariants = LiftedMGroups::default();
        let groups = infer_monotonicity(&pddl, &InferLimits::default(), Some(&mut invariants));

        let at = pddl.preds.find("at").unwrap();
        assert!(groups
            .iter()
            .any(|g| g.atoms.len() == 1 && g.atoms[0].pred == at && g.is_exactly_one));
        assert!(!invariants.is_empty());
    }

    #[test]
    fn goal_aware_extraction_instantiates_fixed_parameters() {
        let pddl = build_pddl(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        let groups = infer_fam_groups(&pddl, &InferLimits::default());
        let goal_aware = groups.extract_goal_aware(&pddl);
        // the counted-variable group matches the goal atom as-is
        assert!(!goal_aware.is_empty());
    }
}

fn initial_candidates_all_counted(pddl: &Pddl, refine: &mut Refine) {
    for pred in pddl.preds.iter() {
        if pred.is_static() || pddl.preds.is_eq(pred.id) {
            continue;
        }
        let mut mg = LiftedMGroup::cand_from_pred(pred.id, &pred.param_types, None);
        for p in &mut mg.params {
            p.is_counted_var = true;
        }
        refine.add_cand(mg, true);
    }
    info!(candidates = refine.cands.len(), "initial candidates");
}

fn initial_candidates_fd(pddl: &Pddl, refine: &mut Refine) {
    for pred in pddl.preds.iter() {
        if pred.is_static() || pddl.preds.is_eq(pred.id) {
            continue;
        }
        refine.add_cand(
            LiftedMGroup::cand_from_pred(pred.id, &pred.param_types, None),
            true,
        );
        for i in 0..pred.param_types.len() {
            refine.add_cand(
                LiftedMGroup::cand_from_pred(pred.id, &pred.param_types, Some(i)),
                true,
            );
        }
    }
    info!(candidates = refine.cands.len(), "initial candidates");
}

/// Instantiates fixed parameters of an init-heavy candidate with concrete
/// objects until the initial state covers each instance exactly once.
fn remove_heaviness_by_instantiation(pddl: &Pddl, cand: &Cand, out: &mut LiftedMGroups) {
    for (i, param) in cand.mgroup.params.iter().enumerate() {
        if !param.is_counted_var {
            instantiate_param(pddl, cand, i, out);
        }
    }
}

fn instantiate_param(pddl: &Pddl, cand: &Cand, param: usize, out: &mut LiftedMGroups) {
    let type_ = cand.mgroup.params[param].type_;
    for &obj in pddl.types.objs_by_type(type_) {
        let mut args = vec![None; cand.mgroup.params.len()];
        args[param] = Some(obj);
        let inst = cand.mgroup.instantiate(&args);
        let inst_cand = Cand {
            mgroup: inst,
            each_pred_only_once: cand.each_pred_only_once,
        };
        if is_init_exactly_one(pddl, &inst_cand, None) {
            add_proved(pddl, &inst_cand.mgroup, out);
        } else {
            for next in param..inst_cand.mgroup.params.len() {
                if !inst_cand.mgroup.params[next].is_counted_var {
                    instantiate_param(pddl, &inst_cand, next, out);
                }
            }
        }
    }
}
