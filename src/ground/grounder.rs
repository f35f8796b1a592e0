//! Fixed-point grounding of preprocessed actions into a STRIPS task.
//!
//! Phase 1 unifies static facts and freezes the static skeleton of every
//! expansion tree; phase 2 runs the relaxed-reachability fixed point over
//! the growing pool of reachable atoms. Every completed argument tuple is
//! rechecked, optionally pruned against lifted mutex groups, and emitted.

use crate::error::{Error, Result};
use crate::ground::{GroundAtom, GroundAtoms, GroundTree, PrepAction, PrepActions, RawArgs};
use crate::mutex::LiftedMGroups;
use crate::pddl::{Cond, CondAtom, ObjId, Pddl};
use crate::strips::{StripsOp, StripsTask};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct GroundConfig {
    /// Lifted mutex groups enabling the two emission-time pruners below.
    pub lifted_mgroups: Option<LiftedMGroups>,
    /// Prune tuples whose grounded precondition covers two atoms of one
    /// lifted mutex group.
    pub prune_op_pre_mutex: bool,
    /// Prune tuples that would delete a goal-aware mutex group outright.
    pub prune_op_dead_end: bool,
    /// Purge static facts from the resulting task.
    pub remove_static_facts: bool,
}

#[derive(Debug, Clone)]
struct GroundArgs {
    action: usize,
    args: Vec<ObjId>,
    op_id: Option<usize>,
}

struct GroundState<'a> {
    pddl: &'a Pddl,
    prune_pre_mutex: Option<&'a LiftedMGroups>,
    prune_dead_end: bool,
    goal_mgroups: LiftedMGroups,
    static_facts: GroundAtoms,
    facts: GroundAtoms,
    funcs: GroundAtoms,
    ground_args: Vec<GroundArgs>,
    observer: Option<&'a mut dyn FnMut(&GroundAtom)>,
}

/// Grounds the normalised description into a STRIPS task.
pub fn ground(pddl: &Pddl, cfg: &GroundConfig) -> Result<StripsTask> {
    ground_with_observer(pddl, cfg, None)
}

/// Like [`ground`], additionally reporting every newly reachable ground
/// atom to `observer` synchronously as the fixed point discovers it.
pub fn ground_with_observer<'a>(
    pddl: &'a Pddl,
    cfg: &'a GroundConfig,
    observer: Option<&'a mut dyn FnMut(&GroundAtom)>,
) -> Result<StripsTask> {
    if !pddl.is_normalized() {
        return Err(Error::semantic(
            "grounding requires a normalized planning description",
        ));
    }
    let prep = PrepActions::new(pddl)?;

    let goal_mgroups = match (&cfg.lifted_mgroups, cfg.prune_op_dead_end) {
        (Some(mgs), true) => mgs.extract_goal_aware(pddl),
        _ => LiftedMGroups::default(),
    };
    let mut state = GroundState {
        pddl,
        prune_pre_mutex: cfg
            .lifted_mgroups
            .as_ref()
            .filter(|_| cfg.prune_op_pre_mutex),
        prune_dead_end: cfg.lifted_mgroups.is_some() && cfg.prune_op_dead_end,
        goal_mgroups,
        static_facts: GroundAtoms::default(),
        facts: GroundAtoms::default(),
        funcs: GroundAtoms::default(),
        ground_args: Vec::new(),
        observer,
    };
    state.seed_from_init();

    let mut atrees: Vec<Vec<GroundTree>> = prep
        .actions
        .iter()
        .map(|a| build_action_trees(pddl, a))
        .collect();

    info!(
        prep_actions = prep.len(),
        lifted_mgroups = cfg.lifted_mgroups.as_ref().map(|m| m.len()).unwrap_or(0),
        "grounding started"
    );

    // Phase 1: actions without positive preconditions fire immediately,
    // then the static facts are exhausted and the trees frozen.
    for (ai, action) in prep.actions.iter().enumerate() {
        if action.pre.is_empty() {
            let arg = vec![None; action.param_types.len()];
            state.ground_action_add_eff(ai, action, arg);
        }
    }
    for i in 0..state.static_facts.len() {
        let fact = state.static_facts.get(i).clone();
        unify_fact_against_all(&mut state, &prep, &mut atrees, &fact, true);
    }
    for trees in &mut atrees {
        for tree in trees {
            tree.block_static();
        }
    }
    info!(
        static_facts = state.static_facts.len(),
        facts = state.facts.len(),
        "static facts unified"
    );

    // Phase 2: reachability fixed point; emission appends new atoms to the
    // pool, which the loop picks up until it drains.
    let mut next = 0;
    while next < state.facts.len() {
        let fact = state.facts.get(next).clone();
        unify_fact_against_all(&mut state, &prep, &mut atrees, &fact, false);
        next += 1;
    }
    info!(
        facts = state.facts.len(),
        tuples = state.ground_args.len(),
        "fixed point reached"
    );

    finalize(state, &prep, cfg)
}

/// Connected parameter groups: two parameters are connected iff some
/// precondition atom mentions both. One tree per group that is actually
/// constrained by the precondition; a single parameterless tree otherwise.
fn build_action_trees(pddl: &Pddl, action: &PrepAction) -> Vec<GroundTree> {
    let n = action.param_types.len();
    let mut used = vec![false; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();

    loop {
        let Some(first) = (0..n).find(|&p| !used[p]) else {
            break;
        };
        let mut group = vec![first];
        let mut used_atom = vec![false; action.pre.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for (i, atom) in action.pre.iter().enumerate() {
                if used_atom[i] {
                    continue;
                }
                let touches = atom
                    .args
                    .iter()
                    .filter_map(|a| a.param())
                    .any(|p| group.contains(&p));
                if touches {
                    used_atom[i] = true;
                    changed = true;
                    for p in atom.args.iter().filter_map(|a| a.param()) {
                        if !group.contains(&p) {
                            group.push(p);
                        }
                    }
                }
            }
        }
        for &p in &group {
            used[p] = true;
        }
        group.sort_unstable();

        let constrained = action.pre.iter().any(|atom| {
            atom.args
                .iter()
                .filter_map(|a| a.param())
                .any(|p| group.contains(&p))
        });
        if constrained {
            groups.push(group);
        }
    }

    if groups.is_empty() {
        groups.push(Vec::new());
    }
    groups
        .into_iter()
        .map(|g| GroundTree::new(&pddl.types, &pddl.preds, action, g))
        .collect()
}

fn unify_fact_against_all(
    state: &mut GroundState<'_>,
    prep: &PrepActions,
    atrees: &mut [Vec<GroundTree>],
    fact: &GroundAtom,
    static_fact: bool,
) {
    for (ai, action) in prep.actions.iter().enumerate() {
        for ti in 0..atrees[ai].len() {
            let start = atrees[ai][ti].args_len();
            atrees[ai][ti].unify_fact(&state.pddl.types, action, fact, static_fact);
            if atrees[ai][ti].args_len() > start
                && atrees[ai].iter().all(|t| t.args_len() > 0)
            {
                emit_tree_products(state, ai, action, &atrees[ai], ti, start);
            }
        }
    }
}

/// Emits every combination of the new tuples of tree `ti` with the tuples
/// of all other trees of the action.
fn emit_tree_products(
    state: &mut GroundState<'_>,
    ai: usize,
    action: &PrepAction,
    trees: &[GroundTree],
    ti: usize,
    start: usize,
) {
    for argi in start..trees[ti].args_len() {
        let merged = trees[ti].args()[argi].clone();
        combine_trees(state, ai, action, trees, ti, merged, 0);
    }
}

fn combine_trees(
    state: &mut GroundState<'_>,
    ai: usize,
    action: &PrepAction,
    trees: &[GroundTree],
    skip_ti: usize,
    args_in: Vec<Option<ObjId>>,
    mut tree_id: usize,
) {
    if tree_id == skip_ti {
        tree_id += 1;
    }
    if tree_id >= trees.len() {
        state.ground_action_add_eff(ai, action, args_in);
        return;
    }
    for tuple in trees[tree_id].args() {
        let mut merged = args_in.clone();
        for (slot, value) in merged.iter_mut().zip(tuple.iter()) {
            if let Some(v) = value {
                debug_assert!(slot.is_none());
                *slot = Some(*v);
            }
        }
        combine_trees(state, ai, action, trees, skip_ti, merged, tree_id + 1);
    }
}

impl<'a> GroundState<'a> {
    fn seed_from_init(&mut self) {
        for atom in self.pddl.init_atoms() {
            let args: RawArgs = atom.ground_args(&[]);
            if self.pddl.preds.get(atom.pred).is_static() {
                self.static_facts.add(atom.pred, args);
            } else {
                self.add_reachable(atom.pred, args);
            }
        }
        for assign in self.pddl.init_assigns() {
            let args: RawArgs = assign.lvalue.ground_args(&[]);
            let (id, _) = self.funcs.add(assign.lvalue.pred, args);
            self.funcs.get_mut(id).func_val = assign.value;
        }
    }

    fn add_reachable(&mut self, pred: crate::pddl::PredId, args: RawArgs) {
        let (id, new) = self.facts.add(pred, args);
        if new {
            if let Some(observer) = self.observer.as_mut() {
                let atom = self.facts.get(id).clone();
                observer(&atom);
            }
        }
    }

    /// Completes a partial tuple by enumerating unbound parameters over
    /// their type extents, rechecks applicability, prunes, and emits.
    fn ground_action_add_eff(
        &mut self,
        ai: usize,
        action: &PrepAction,
        args: Vec<Option<ObjId>>,
    ) {
        let mut args = args;
        self.fill_and_emit(ai, action, &mut args, 0);
    }

    fn fill_and_emit(
        &mut self,
        ai: usize,
        action: &PrepAction,
        args: &mut Vec<Option<ObjId>>,
        from: usize,
    ) {
        let mut argi = from;
        while argi < args.len() && args[argi].is_some() {
            argi += 1;
        }
        if argi < args.len() {
            let objs: Vec<ObjId> = self
                .pddl
                .types
                .objs_by_type(action.param_types[argi])
                .to_vec();
            for obj in objs {
                args[argi] = Some(obj);
                self.fill_and_emit(ai, action, args, argi + 1);
                args[argi] = None;
            }
            return;
        }

        let full: Vec<ObjId> = args.iter().map(|a| a.unwrap()).collect();
        if !action.check(&self.pddl.types, &self.static_facts, &full) {
            return;
        }

        if let Some(mgroups) = self.prune_pre_mutex {
            if mgroups.is_grounded_conj_too_heavy(self.pddl, &action.pre, &full) {
                return;
            }
        }
        if self.prune_dead_end
            && action.parent.is_none()
            && self.goal_mgroups.any_is_deleted(
                self.pddl,
                &action.pre,
                &action.add_eff,
                &action.del_eff,
                &full,
            )
        {
            return;
        }

        for atom in &action.add_eff {
            let args: RawArgs = atom.ground_args(&full);
            self.add_reachable(atom.pred, args);
        }
        self.ground_args.push(GroundArgs {
            action: ai,
            args: full,
            op_id: None,
        });
    }
}

/* ----- finalisation ----- */

fn op_name(pddl: &Pddl, action_id: usize, args: &[ObjId]) -> String {
    let action = &pddl.actions[action_id];
    let mut name = action.name.to_string();
    for param_idx in 0..action.params.len() {
        name.push(' ');
        name.push_str(pddl.objects.get(args[param_idx]).name.as_str());
    }
    name
}

fn finalize(
    mut state: GroundState<'_>,
    prep: &PrepActions,
    cfg: &GroundConfig,
) -> Result<StripsTask> {
    let pddl = state.pddl;
    let mut task = StripsTask {
        domain_name: pddl.domain_name.clone(),
        problem_name: pddl.problem_name.clone(),
        ..StripsTask::default()
    };

    // Fact table: reachable atoms first, then static initial atoms so that
    // the purge stage can decide their fate.
    let mut atom_to_fact: HashMap<(crate::pddl::PredId, crate::ground::ArgTuple), usize> =
        HashMap::new();
    for ga in state.facts.iter() {
        let fid = task.facts.add_ground_atom(ga, pddl);
        atom_to_fact.insert((ga.pred, ga.args), fid);
    }
    for ga in state.static_facts.iter() {
        let fid = task.facts.add_ground_atom(ga, pddl);
        atom_to_fact.insert((ga.pred, ga.args), fid);
    }
    task.facts.link_neg_twins(pddl);

    sort_ground_args(&mut state.ground_args, prep);

    // Operators, with conditional-effect children attached to (or folded
    // into) the parent tuple they directly follow.
    let mut parent_idx: Option<usize> = None;
    for gi in 0..state.ground_args.len() {
        let ga = state.ground_args[gi].clone();
        let action = &prep.actions[ga.action];
        debug_assert!(action.check(&pddl.types, &state.static_facts, &ga.args));

        let mut op = StripsOp::new(op_name(pddl, action.action_id, &ga.args));
        if action.parent.is_some() && !action.increase.is_empty() {
            return Err(Error::semantic(
                "costs in conditional effects are not supported",
            ));
        }
        ground_atom_set(&atom_to_fact, &action.pre, &ga.args, &mut op.pre);
        ground_atom_set(&atom_to_fact, &action.add_eff, &ga.args, &mut op.add_eff);
        ground_atom_set(&atom_to_fact, &action.del_eff, &ga.args, &mut op.del_eff);
        op.cost = if pddl.metric {
            ground_increase(&state, action, &ga.args)
        } else {
            1
        };
        op.normalize();

        if action.parent.is_none() {
            parent_idx = Some(gi);
        }

        if !op.has_effect() {
            continue;
        }
        if action.parent.is_none() {
            let op_id = task.ops.len();
            task.ops.push(op);
            state.ground_args[gi].op_id = Some(op_id);
        } else {
            attach_cond_eff(&mut task, &mut state, prep, parent_idx, op, pddl)?;
        }
    }

    ground_init_state(&state, &atom_to_fact, &mut task);
    ground_goal(&atom_to_fact, &mut task, pddl)?;

    // Dense name-sorted fact ids.
    let remap = task.facts.sort_by_name();
    for op in &mut task.ops {
        op.permute_facts(&remap);
    }
    task.init = task.init.iter().map(|&f| remap[f]).collect();
    task.goal = task.goal.iter().map(|&f| remap[f]).collect();

    task.dedup_ops();
    task.has_cond_eff = task.ops.iter().any(|op| !op.cond_eff.is_empty());

    if cfg.remove_static_facts {
        task.remove_static_facts(&pddl.preds);
    }
    if task.goal_is_unreachable {
        warn!("goal is unreachable; emitting the unsolvable skeleton");
        task.make_unsolvable();
    }

    info!(
        facts = task.facts.len(),
        ops = task.ops.len(),
        cond_eff = task.has_cond_eff,
        "grounded to STRIPS"
    );
    debug_assert!(task.check_invariants());
    Ok(task)
}

/// Sorts tuples so every conditional-effect child sits right after its
/// parent tuple, and removes duplicates.
fn sort_ground_args(ground_args: &mut Vec<GroundArgs>, prep: &PrepActions) {
    let effective = |ga: &GroundArgs| prep.actions[ga.action].parent.unwrap_or(ga.action);
    ground_args.sort_by(|a, b| {
        effective(a)
            .cmp(&effective(b))
            .then_with(|| a.args.cmp(&b.args))
            .then_with(|| {
                let a_parent = prep.actions[a.action].parent.is_some();
                let b_parent = prep.actions[b.action].parent.is_some();
                a_parent.cmp(&b_parent)
            })
            .then_with(|| a.action.cmp(&b.action))
    });
    let before = ground_args.len();
    ground_args.dedup_by(|a, b| a.action == b.action && a.args == b.args);
    if ground_args.len() != before {
        warn!("duplicate grounded action -- this should not happen");
    }
}

fn ground_atom_set(
    atom_to_fact: &HashMap<(crate::pddl::PredId, crate::ground::ArgTuple), usize>,
    atoms: &[CondAtom],
    args: &[ObjId],
    out: &mut BTreeSet<usize>,
) {
    for atom in atoms {
        let key = (atom.pred, crate::ground::ArgTuple::new(atom.ground_args(args)));
        if let Some(&fid) = atom_to_fact.get(&key) {
            out.insert(fid);
        }
    }
}

fn ground_increase(state: &GroundState<'_>, action: &PrepAction, args: &[ObjId]) -> i32 {
    let mut cost = 0;
    for inc in &action.increase {
        if let Some(fvalue) = &inc.fvalue {
            if let Some(ga) = state.funcs.find_cond_atom(fvalue, args) {
                cost += ga.func_val;
            }
        } else {
            cost += inc.value;
        }
    }
    cost
}

fn attach_cond_eff(
    task: &mut StripsTask,
    state: &mut GroundState<'_>,
    prep: &PrepActions,
    parent_idx: Option<usize>,
    mut op: StripsOp,
    pddl: &Pddl,
) -> Result<()> {
    let parent_gi =
        parent_idx.ok_or_else(|| Error::semantic("conditional effect without parent tuple"))?;

    // A parent skipped for lack of effects is created lazily now.
    if state.ground_args[parent_gi].op_id.is_none() {
        let pga = state.ground_args[parent_gi].clone();
        let paction = &prep.actions[pga.action];
        let mut parent_op = StripsOp::new(op_name(pddl, paction.action_id, &pga.args));
        let mut atom_to_fact = HashMap::new();
        for fact in task.facts.iter() {
            if let Some(key) = fact.ground_atom {
                atom_to_fact.insert(key, fact.id);
            }
        }
        ground_atom_set(&atom_to_fact, &paction.pre, &pga.args, &mut parent_op.pre);
        parent_op.cost = if pddl.metric {
            ground_increase(state, paction, &pga.args)
        } else {
            1
        };
        let op_id = task.ops.len();
        task.ops.push(parent_op);
        state.ground_args[parent_gi].op_id = Some(op_id);
    }

    let parent_op_id = state.ground_args[parent_gi].op_id.unwrap();
    let parent = &mut task.ops[parent_op_id];

    // Preconditions shared with the parent belong to the parent.
    op.pre = &op.pre - &parent.pre;
    if op.pre.is_empty() {
        parent.merge_effects(&op);
    } else {
        parent.add_cond_eff(&op);
        task.has_cond_eff = true;
    }
    Ok(())
}

fn ground_init_state(
    state: &GroundState<'_>,
    atom_to_fact: &HashMap<(crate::pddl::PredId, crate::ground::ArgTuple), usize>,
    task: &mut StripsTask,
) {
    for atom in state.pddl.init_atoms() {
        let key = (
            atom.pred,
            crate::ground::ArgTuple::new(atom.ground_args(&[])),
        );
        if let Some(&fid) = atom_to_fact.get(&key) {
            task.init.insert(fid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::infer_fam_groups;
    use crate::mutex::InferLimits;
    use crate::test_utils::*;

    #[test]
    fn travel_grounds_to_three_facts_and_six_operators() {
        let task = ground_fixture(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);

        assert_eq!(task.facts.len(), 3);
        assert_eq!(
            task.facts.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["(at a)", "(at b)", "(at c)"]
        );
        assert_eq!(
            task.op_names(),
            vec![
                "move a b", "move a c", "move b a", "move b c", "move c a", "move c b",
            ]
        );
        assert!(!task.goal_is_unreachable);
        assert!(!task.has_cond_eff);
        assert!(task.check_invariants());

        let ab = task.op_by_name("move a b").unwrap();
        let at_a = task.fact_by_name("(at a)").unwrap();
        let at_b = task.fact_by_name("(at b)").unwrap();
        assert_eq!(task.ops[ab].pre, [at_a].into_iter().collect());
        assert_eq!(task.ops[ab].add_eff, [at_b].into_iter().collect());
        assert_eq!(task.ops[ab].del_eff, [at_a].into_iter().collect());
        assert_eq!(task.ops[ab].cost, 1);

        assert_eq!(task.init, [at_a].into_iter().collect());
        assert_eq!(
            task.goal,
            [task.fact_by_name("(at c)").unwrap()].into_iter().collect()
        );
    }

    #[test]
    fn beacon_goal_is_unreachable() {
        let task = ground_fixture(BEACON_DOMAIN_TEXT, BEACON_PROBLEM01_TEXT);

        assert_eq!(task.facts.len(), 2);
        assert!(task.ops.is_empty());
        assert!(task.goal_is_unreachable);
        let lit_a = task.fact_by_name("(lit a)").unwrap();
        let lit_b = task.fact_by_name("(lit b)").unwrap();
        assert_eq!(task.init, [lit_a].into_iter().collect());
        assert_eq!(task.goal, [lit_b].into_iter().collect());
    }

    #[test]
    fn workshop_costs_and_conditional_effects() {
        let task = ground_fixture(WORKSHOP_DOMAIN_TEXT, WORKSHOP_PROBLEM01_TEXT);

        assert_eq!(
            task.op_names(),
            vec!["buff rag p1", "drop rag", "grab rag", "polish-all rag", "shake rag"]
        );
        assert_eq!(task.ops[task.op_by_name("grab rag").unwrap()].cost, 1);
        assert_eq!(task.ops[task.op_by_name("polish-all rag").unwrap()].cost, 2);
        assert_eq!(task.ops[task.op_by_name("buff rag p1").unwrap()].cost, 2);

        // the fragile part's conditional clean-up was resolved statically;
        // the dynamic one on p1 survives as a conditional effect
        let shake = &task.ops[task.op_by_name("shake rag").unwrap()];
        assert_eq!(shake.cond_eff.len(), 1);
        let clean_p1 = task.fact_by_name("(clean p1)").unwrap();
        assert_eq!(shake.cond_eff[0].pre, [clean_p1].into_iter().collect());
        assert_eq!(shake.cond_eff[0].del_eff, [clean_p1].into_iter().collect());
        assert!(shake.cond_eff[0].add_eff.is_empty());
        assert!(task.has_cond_eff);
        assert!(task.check_invariants());
    }

    #[test]
    fn static_fact_purge_drops_untouched_static_facts() {
        let pddl = build_pddl(WORKSHOP_DOMAIN_TEXT, WORKSHOP_PROBLEM01_TEXT);
        let cfg = GroundConfig {
            remove_static_facts: true,
            ..GroundConfig::default()
        };
        let task = ground(&pddl, &cfg).unwrap();
        assert!(task.fact_by_name("(fragile p2)").is_none());
        assert!(!task.goal_is_unreachable);
        assert!(task.check_invariants());
    }

    #[test]
    fn pre_mutex_pruning_drops_impossible_tuples() {
        let pddl = build_pddl(DUALMOVE_DOMAIN_TEXT, DUALMOVE_PROBLEM01_TEXT);
        let mgroups = infer_fam_groups(&pddl, &InferLimits::default());
        let cfg = GroundConfig {
            lifted_mgroups: Some(mgroups),
            prune_op_pre_mutex: true,
            prune_op_dead_end: true,
            ..GroundConfig::default()
        };
        let pruned = ground(&pddl, &cfg).unwrap();
        let unpruned = ground(&pddl, &GroundConfig::default()).unwrap();
        // nothing in dualmove is actually prunable, so both agree
        assert_eq!(pruned.op_names(), unpruned.op_names());
        assert!(pruned.check_invariants());
    }

    #[test]
    fn fully_ground_problem_grounds_one_to_one() {
        let domain = parse_sexp(
            "(define (domain flip) (:requirements :strips)
               (:predicates (on) (off))
               (:action turn-on :parameters ()
                 :precondition (off)
                 :effect (and (on) (not (off))))
               (:action turn-off :parameters ()
                 :precondition (on)
                 :effect (and (off) (not (on)))))",
        );
        let problem = parse_sexp(
            "(define (problem flip-1) (:domain flip)
               (:init (off)) (:goal (on)))",
        );
        let mut pddl =
            crate::pddl::Pddl::from_lisp(&domain, &problem, &crate::pddl::PddlConfig::default())
                .unwrap();
        pddl.normalize().unwrap();
        let task = ground(&pddl, &GroundConfig::default()).unwrap();

        // without abstract parameters the operator set equals the input
        assert_eq!(task.op_names(), vec!["turn-off", "turn-on"]);
        let on = task.fact_by_name("(on)").unwrap();
        let off = task.fact_by_name("(off)").unwrap();
        let turn_on = &task.ops[task.op_by_name("turn-on").unwrap()];
        assert_eq!(turn_on.pre, [off].into_iter().collect());
        assert_eq!(turn_on.add_eff, [on].into_iter().collect());
        assert_eq!(turn_on.del_eff, [off].into_iter().collect());
    }

    #[test]
    fn observer_sees_every_reachable_atom() {
        let pddl = build_pddl(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        let mut seen = Vec::new();
        let mut observer = |atom: &GroundAtom| seen.push((atom.pred, atom.args));
        let task =
            ground_with_observer(&pddl, &GroundConfig::default(), Some(&mut observer)).unwrap();
        // every reachable fact was announced exactly once
        assert_eq!(seen.len(), task.facts.len());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), task.facts.len());
    }
}

fn ground_goal(
    atom_to_fact: &HashMap<(crate::pddl::PredId, crate::ground::ArgTuple), usize>,
    task: &mut StripsTask,
    pddl: &Pddl,
) -> Result<()> {
    match &pddl.goal {
        Cond::Bool(true) => return Ok(()),
        Cond::Bool(false) => {
            task.goal_is_unreachable = true;
            return Ok(());
        }
        Cond::Or(_) => {
            return Err(Error::semantic(
                "only conjunctive goal specifications are supported",
            ))
        }
        _ => {}
    }
    let atoms = pddl
        .goal
        .conjunction_atoms()
        .map_err(|_| Error::semantic("only conjunctive goal specifications are supported"))?;
    for atom in atoms {
        if !atom.is_grounded() {
            return Err(Error::semantic(
                "goal specification cannot contain parametrized atoms",
            ));
        }
        let key = (
            atom.pred,
            crate::ground::ArgTuple::new(atom.ground_args(&[])),
        );
        if let Some(&fid) = atom_to_fact.get(&key) {
            task.goal.insert(fid);
        } else {
            // The goal atom is not reachable; it still becomes a fact so
            // the goal stays representable in the output.
            let ga = GroundAtom {
                id: 0,
                pred: atom.pred,
                args: crate::ground::ArgTuple::new(atom.ground_args(&[])),
                func_val: 0,
            };
            let fid = task.facts.add_ground_atom(&ga, pddl);
            task.goal.insert(fid);
            task.goal_is_unreachable = true;
        }
    }
    Ok(())
}
