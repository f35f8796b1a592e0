//! Propositional mutex groups, including the grounding of lifted groups
//! via per-atom prefix trees keyed on the shared fixed parameters.

use crate::error::{Error, Result};
use crate::mutex::{LiftedMGroup, LiftedMGroups};
use crate::pddl::{CondArg, CondAtom, ObjId, Pddl};
use crate::strips::{FactId, StripsTask};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MGroup {
    pub facts: BTreeSet<FactId>,
    /// Back-link into the lifted groups this was grounded from, if any.
    pub lifted_mgroup_id: Option<usize>,
    pub is_exactly_one: bool,
    pub is_fam_group: bool,
    pub is_goal: bool,
}

impl MGroup {
    pub fn new(facts: BTreeSet<FactId>) -> Self {
        Self {
            facts,
            lifted_mgroup_id: None,
            is_exactly_one: false,
            is_fam_group: false,
            is_goal: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MGroups {
    pub lifted: LiftedMGroups,
    pub groups: Vec<MGroup>,
}

impl MGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn add(&mut self, facts: BTreeSet<FactId>) -> &mut MGroup {
        self.groups.push(MGroup::new(facts));
        self.groups.last_mut().unwrap()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MGroup> {
        self.groups.iter()
    }

    /// Grounds every lifted group against the task's fact table.
    pub fn ground(pddl: &Pddl, lifted: &LiftedMGroups, task: &StripsTask) -> MGroups {
        let mut mgs = MGroups {
            lifted: lifted.clone(),
            groups: Vec::new(),
        };
        for (id, mg) in lifted.iter().enumerate() {
            ground_mgroup(&mut mgs, pddl, task, mg, id);
        }
        mgs.sort_uniq();

        for group in &mut mgs.groups {
            if let Some(id) = group.lifted_mgroup_id {
                if mgs.lifted.groups[id].is_exactly_one {
                    group.is_exactly_one = true;
                }
                group.is_fam_group = true;
            }
        }
        info!(lifted = lifted.len(), grounded = mgs.len(), "grounded mutex groups");
        mgs
    }

    /// Sorts by (size, facts, origin) and removes duplicate fact sets.
    pub fn sort_uniq(&mut self) {
        self.groups.sort_by(|a, b| {
            a.facts
                .len()
                .cmp(&b.facts.len())
                .then_with(|| a.facts.cmp(&b.facts))
                .then_with(|| a.lifted_mgroup_id.cmp(&b.lifted_mgroup_id))
        });
        self.groups.dedup_by(|a, b| a.facts == b.facts);
    }

    /// Re-derives the exactly-one flag on the ground task: the group must
    /// intersect the initial state and no operator may delete a covered
    /// fact without adding another.
    pub fn set_exactly_one(&mut self, task: &StripsTask) -> usize {
        let mut num = 0;
        for mg in &mut self.groups {
            if mg.facts.is_disjoint(&task.init) {
                mg.is_exactly_one = false;
                continue;
            }
            mg.is_exactly_one = true;
            'ops: for op in &task.ops {
                if !op.del_eff.is_disjoint(&mg.facts) && op.add_eff.is_disjoint(&mg.facts) {
                    mg.is_exactly_one = false;
                    break;
                }
                for ce in &op.cond_eff {
                    if !ce.del_eff.is_disjoint(&mg.facts)
                        && ce.add_eff.is_disjoint(&mg.facts)
                        && op.add_eff.is_disjoint(&mg.facts)
                    {
                        mg.is_exactly_one = false;
                        break 'ops;
                    }
                }
            }
            if mg.is_exactly_one {
                num += 1;
            }
        }
        num
    }

    pub fn set_goal(&mut self, task: &StripsTask) -> usize {
        let mut num = 0;
        for mg in &mut self.groups {
            if !mg.facts.is_disjoint(&task.goal) {
                mg.is_goal = true;
                num += 1;
            }
        }
        num
    }

    pub fn gather_exactly_one_facts(&self) -> BTreeSet<FactId> {
        let mut out = BTreeSet::new();
        for mg in &self.groups {
            if mg.is_exactly_one {
                out.extend(mg.facts.iter().copied());
            }
        }
        out
    }

    /// Rewrites fact references after fact removal and drops emptied
    /// groups.
    pub fn reduce(&mut self, remap: &[Option<FactId>]) {
        self.groups.retain_mut(|mg| {
            mg.facts = mg.facts.iter().filter_map(|&f| remap[f]).collect();
            !mg.facts.is_empty()
        });
        self.sort_uniq();
    }

    pub fn remove_small(&mut self, size: usize) {
        self.groups.retain(|mg| mg.facts.len() > size);
    }

    /// The minimum number of groups (plus uncovered facts) needed to cover
    /// the fact set; requires a linear-programming solver, which is not
    /// linked into this build.
    pub fn cover_number(&self, _fact_size: usize) -> Result<usize> {
        Err(Error::unsupported(
            "mutex group cover number requires an LP solver, which is not available",
        ))
    }
}

/* ----- prefix-tree grounding ----- */

#[derive(Debug)]
struct PredTNode {
    obj: Option<ObjId>,
    depth: usize,
    children: Vec<PredTNode>,
    facts: BTreeSet<FactId>,
}

impl PredTNode {
    fn new(obj: Option<ObjId>, depth: usize) -> Self {
        Self {
            obj,
            depth,
            children: Vec::new(),
            facts: BTreeSet::new(),
        }
    }
}

/// One prefix tree per group atom, keyed on the atom's fixed parameters in
/// ascending parameter order; leaves hold the matching facts.
#[derive(Debug)]
struct PredTree {
    /// Fixed parameters keyed by this tree, outermost first.
    params: Vec<usize>,
    /// Argument position of each keyed parameter within the atom.
    arg_pos: Vec<usize>,
    root: PredTNode,
}

impl PredTree {
    fn new(mg: &LiftedMGroup, atom: &CondAtom) -> Self {
        let mut keyed: Vec<(usize, usize)> = atom
            .args
            .iter()
            .enumerate()
            .filter_map(|(pos, arg)| match arg {
                CondArg::Param(p) if !mg.params[*p].is_counted_var => Some((*p, pos)),
                _ => None,
            })
            .collect();
        keyed.sort_unstable();
        keyed.dedup_by_key(|&mut (p, _)| p);
        Self {
            params: keyed.iter().map(|&(p, _)| p).collect(),
            arg_pos: keyed.iter().map(|&(_, pos)| pos).collect(),
            root: PredTNode::new(None, 0),
        }
    }

    fn add(&mut self, fact_id: FactId, fact_args: &[ObjId]) {
        let mut node = &mut self.root;
        for depth in 0..self.params.len() {
            let obj = fact_args[self.arg_pos[depth]];
            let pos = node.children.iter().position(|c| c.obj == Some(obj));
            let idx = match pos {
                Some(i) => i,
                None => {
                    node.children.push(PredTNode::new(Some(obj), depth + 1));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
        }
        node.facts.insert(fact_id);
    }
}

fn fact_matches_atom(
    pddl: &Pddl,
    mg: &LiftedMGroup,
    atom: &CondAtom,
    fact_args: &[ObjId],
) -> bool {
    if atom.args.len() != fact_args.len() {
        return false;
    }
    atom.args.iter().zip(fact_args.iter()).all(|(arg, &obj)| match arg {
        CondArg::Obj(o) => *o == obj,
        CondArg::Param(p) => pddl.types.obj_has_type(mg.params[*p].type_, obj),
    })
}

fn ground_mgroup(
    mgs: &mut MGroups,
    pddl: &Pddl,
    task: &StripsTask,
    mg: &LiftedMGroup,
    lifted_id: usize,
) {
    if mg.atoms.is_empty() {
        return;
    }

    let mut trees: Vec<PredTree> = mg.atoms.iter().map(|a| PredTree::new(mg, a)).collect();
    for fact in task.facts.iter() {
        let Some((pred, args)) = &fact.ground_atom else {
            continue;
        };
        for (ci, atom) in mg.atoms.iter().enumerate() {
            if atom.pred == *pred && fact_matches_atom(pddl, mg, atom, args.as_slice()) {
                trees[ci].add(fact.id, args.as_slice());
            }
        }
    }

    let mut shared: Vec<usize> = trees.iter().flat_map(|t| t.params.iter().copied()).collect();
    shared.sort_unstable();
    shared.dedup();

    let tnodes: Vec<&PredTNode> = trees.iter().map(|t| &t.root).collect();
    generate(&trees, &tnodes, 0, &shared, lifted_id, mgs);
}

/// Depth-first co-traversal over all atom trees ordered by the shared
/// parameters; each consistent binding of the shared parameters yields one
/// propositional group.
fn generate(
    trees: &[PredTree],
    tnodes: &[&PredTNode],
    param_i: usize,
    shared: &[usize],
    lifted_id: usize,
    mgs: &mut MGroups,
) {
    if param_i == shared.len() {
        let mut facts: BTreeSet<FactId> = BTreeSet::new();
        for (tree, node) in trees.iter().zip(tnodes.iter()) {
            if node.depth == tree.params.len() {
                facts.extend(node.facts.iter().copied());
            }
        }
        if !facts.is_empty() {
            let group = mgs.add(facts);
            group.lifted_mgroup_id = Some(lifted_id);
        }
        return;
    }

    let param = shared[param_i];
    let mut relevant: Vec<usize> = Vec::new();
    let mut objs: Vec<ObjId> = Vec::new();
    for (ti, tree) in trees.iter().enumerate() {
        let node = tnodes[ti];
        if node.depth < tree.params.len() && tree.params[node.depth] == param {
            relevant.push(ti);
            for child in &node.children {
                if let Some(obj) = child.obj {
                    if !objs.contains(&obj) {
                        objs.push(obj);
                    }
                }
            }
        }
    }
    objs.sort_unstable();

    for obj in objs {
        let mut next: Vec<&PredTNode> = tnodes.to_vec();
        for &ti in &relevant {
            for child in &tnodes[ti].children {
                if child.obj == Some(obj) {
                    next[ti] = child;
                }
            }
        }
        generate(trees, &next, param_i + 1, shared, lifted_id, mgs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::{infer_fam_groups, InferLimits};
    use crate::test_utils::*;

    #[test]
    fn travel_group_grounds_to_all_three_location_facts() {
        let pddl = build_pddl(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        let lifted = infer_fam_groups(&pddl, &InferLimits::default());
        let task = ground_fixture(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);

        let mut mgs = MGroups::ground(&pddl, &lifted, &task);
        let expected: BTreeSet<_> = (0..3)
            .map(|i| task.fact_by_name(["(at a)", "(at b)", "(at c)"][i]).unwrap())
            .collect();
        assert!(mgs.iter().any(|g| g.facts == expected && g.is_fam_group));

        assert!(mgs.set_exactly_one(&task) >= 1);
        let group = mgs.iter().find(|g| g.facts == expected).unwrap();
        assert!(group.is_exactly_one);
    }

    #[test]
    fn dualmove_groups_ground_to_one_pair_each() {
        let pddl = build_pddl(DUALMOVE_DOMAIN_TEXT, DUALMOVE_PROBLEM01_TEXT);
        let lifted = infer_fam_groups(&pddl, &InferLimits::default());
        let task = ground_fixture(DUALMOVE_DOMAIN_TEXT, DUALMOVE_PROBLEM01_TEXT);
        let mgs = MGroups::ground(&pddl, &lifted, &task);

        for pred in ["at1", "at2"] {
            let facts: BTreeSet<_> = ["a", "b"]
                .iter()
                .map(|o| task.fact_by_name(&format!("({} {})", pred, o)).unwrap())
                .collect();
            let matching: Vec<_> = mgs.iter().filter(|g| g.facts == facts).collect();
            assert_eq!(matching.len(), 1, "one grounded group for {}", pred);
            assert_eq!(matching[0].facts.len(), 2);
        }
    }

    #[test]
    fn goal_marking_flags_groups_meeting_the_goal() {
        let pddl = build_pddl(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        let lifted = infer_fam_groups(&pddl, &InferLimits::default());
        let task = ground_fixture(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        let mut mgs = MGroups::ground(&pddl, &lifted, &task);
        assert!(mgs.set_goal(&task) >= 1);
    }

    #[test]
    fn cover_number_is_unavailable_without_an_lp_solver() {
        let mgs = MGroups::default();
        assert!(mgs.cover_number(0).is_err());
    }

    #[test]
    fn sort_uniq_removes_duplicate_fact_sets() {
        let mut mgs = MGroups::default();
        mgs.add([1, 2].into_iter().collect());
        mgs.add([0].into_iter().collect());
        mgs.add([1, 2].into_iter().collect());
        mgs.sort_uniq();
        assert_eq!(mgs.len(), 2);
        assert_eq!(mgs.groups[0].facts, [0].into_iter().collect());

        let snapshot = mgs.groups.clone();
        mgs.sort_uniq();
        assert_eq!(mgs.groups, snapshot);
    }
}
