//! Expansion trees. One tree covers a connected group of an action's
//! parameters and enumerates partial argument bindings consistent with the
//! precondition atoms unified so far. Nodes live in an arena and refer to
//! each other by index.

use crate::ground::{GroundAtom, PrepAction};
use crate::pddl::{ObjId, PredId, Predicates, Types};
use std::collections::HashMap;

const NO_PARAM: usize = usize::MAX;

/// How large a parameter's type extent may be for the tree to instantiate
/// it eagerly at construction time.
const PRE_INSTANTIATE_MAX_OBJS: usize = 3;

#[derive(Debug, Clone)]
struct TNode {
    /// Parameter bound at this node; `NO_PARAM` for the root.
    param: usize,
    obj: ObjId,
    /// Precondition atoms matched on the path through this node.
    pre_unified: usize,
    /// No further children may be attached here.
    blocked: bool,
    /// This node itself completed the match of a precondition atom.
    flag_pre_unified: bool,
    /// The binding was forced by a static fact.
    static_arg: bool,
    children: Vec<usize>,
}

impl TNode {
    fn new(param: usize, obj: ObjId, pre_unified: usize) -> Self {
        Self {
            param,
            obj,
            pre_unified,
            blocked: false,
            flag_pre_unified: false,
            static_arg: false,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroundTree {
    /// Sorted members of this tree's connected parameter group.
    params: Vec<usize>,
    /// Precondition indices relevant to this tree, per predicate.
    pred_to_pre: HashMap<PredId, Vec<usize>>,
    pre_size: usize,
    pre_static_size: usize,
    nodes: Vec<TNode>,
    /// Materialised partial argument tuples (bound on this tree's
    /// parameters only).
    args: Vec<Vec<Option<ObjId>>>,
}

impl GroundTree {
    pub fn new(
        types: &Types,
        preds: &Predicates,
        action: &PrepAction,
        params: Vec<usize>,
    ) -> Self {
        let mut pred_to_pre: HashMap<PredId, Vec<usize>> = HashMap::new();
        let mut pre_size = 0;
        let mut pre_static_size = 0;
        for (i, atom) in action.pre.iter().enumerate() {
            let relevant = atom
                .args
                .iter()
                .all(|a| a.param().map(|p| params.contains(&p)).unwrap_or(true));
            if !relevant {
                continue;
            }
            pre_size += 1;
            pred_to_pre.entry(atom.pred).or_default().push(i);
            if preds.get(atom.pred).is_static() {
                pre_static_size += 1;
            }
        }

        let mut tree = Self {
            params,
            pred_to_pre,
            pre_size,
            pre_static_size,
            nodes: vec![TNode::new(NO_PARAM, usize::MAX, 0)],
            args: Vec::new(),
        };
        tree.instantiate_args(types, action, 0, 0, 1);
        tree
    }

    pub fn args(&self) -> &[Vec<Option<ObjId>>] {
        &self.args
    }

    pub fn args_len(&self) -> usize {
        self.args.len()
    }

    /// Eagerly enumerates parameters with tiny type extents (size 1 up to
    /// [`PRE_INSTANTIATE_MAX_OBJS`]) below `node`, smallest extents first.
    fn instantiate_args(
        &mut self,
        types: &Types,
        action: &PrepAction,
        node: usize,
        param_start: usize,
        extent: usize,
    ) {
        for idx in 0..self.params.len() {
            let param = self.params[idx];
            if param < param_start {
                continue;
            }
            let objs = types.objs_by_type(action.param_types[param]);
            if objs.len() != extent {
                continue;
            }
            let objs: Vec<ObjId> = objs.to_vec();
            for obj in objs {
                let child = self.add_child(node, param, obj);
                self.instantiate_args(types, action, child, param + 1, extent);
            }
            self.nodes[node].blocked = true;
            return;
        }

        if extent < PRE_INSTANTIATE_MAX_OBJS {
            self.instantiate_args(types, action, node, 0, extent + 1);
        } else {
            self.nodes[node].flag_pre_unified = true;
        }
    }

    fn add_child(&mut self, parent: usize, param: usize, obj: ObjId) -> usize {
        let pre_unified = self.nodes[parent].pre_unified;
        let id = self.nodes.len();
        self.nodes.push(TNode::new(param, obj, pre_unified));
        self.nodes[parent].children.push(id);
        id
    }

    /// Unifies a newly observed ground atom against every precondition slot
    /// of this tree that shares its predicate.
    pub fn unify_fact(
        &mut self,
        types: &Types,
        action: &PrepAction,
        fact: &GroundAtom,
        static_fact: bool,
    ) {
        let Some(pre_idxs) = self.pred_to_pre.get(&fact.pred) else {
            return;
        };
        for pre_i in pre_idxs.clone() {
            self.unify_slot(types, action, fact, pre_i, static_fact);
        }
    }

    fn unify_slot(
        &mut self,
        types: &Types,
        action: &PrepAction,
        fact: &GroundAtom,
        pre_i: usize,
        static_fact: bool,
    ) {
        if !action.check_fact(types, pre_i, fact.args.as_slice()) {
            return;
        }

        let n = action.param_types.len();
        let mut arg: Vec<Option<ObjId>> = vec![None; n];
        let mut arg_pre: Vec<Option<ObjId>> = vec![None; n];
        let mut num_set = 0;
        let atom = &action.pre[pre_i];
        for (i, a) in atom.args.iter().enumerate() {
            if let Some(param) = a.param() {
                match arg_pre[param] {
                    None => {
                        arg_pre[param] = Some(fact.args[i]);
                        num_set += 1;
                    }
                    Some(existing) if existing != fact.args[i] => return,
                    Some(_) => {}
                }
            }
        }

        self.unify(action, 0, &mut arg, num_set, &arg_pre, true, static_fact);
    }

    fn unify(
        &mut self,
        action: &PrepAction,
        node: usize,
        arg: &mut Vec<Option<ObjId>>,
        remain: usize,
        arg_pre: &[Option<ObjId>],
        parent_match: bool,
        static_fact: bool,
    ) {
        if !action.check_eq(arg, true) {
            return;
        }
        if remain == 0 {
            self.unify_pre(node, arg);
            return;
        }

        let mut matched = false;
        let children = self.nodes[node].children.clone();
        for ch in children {
            let param = self.nodes[ch].param;
            let obj = self.nodes[ch].obj;
            arg[param] = arg_pre[param];
            if arg[param] == Some(obj) {
                if static_fact {
                    self.nodes[ch].static_arg = true;
                }
                self.unify(action, ch, arg, remain - 1, arg_pre, true, static_fact);
                matched = true;
            } else if arg[param].is_none() {
                arg[param] = Some(obj);
                self.unify(action, ch, arg, remain, arg_pre, false, static_fact);
            }
            arg[param] = None;
        }

        // A new branch may open only when no existing child matched, this
        // node still accepts children, and either the parent matched or
        // this node closed a precondition before.
        if !matched
            && !self.nodes[node].blocked
            && (parent_match || self.nodes[node].flag_pre_unified)
        {
            self.unify_new(action, node, arg, remain, arg_pre, static_fact);
        }
    }

    fn unify_new(
        &mut self,
        action: &PrepAction,
        node: usize,
        arg: &mut Vec<Option<ObjId>>,
        remain: usize,
        arg_pre: &[Option<ObjId>],
        static_fact: bool,
    ) {
        // To reduce branching, prefer a parameter that already has children
        // on this level.
        let children = self.nodes[node].children.clone();
        for ch in children {
            let param = self.nodes[ch].param;
            if arg[param].is_none() && arg_pre[param].is_some() {
                self.unify_new_arg(action, node, arg, param, remain, arg_pre, static_fact);
                return;
            }
        }
        for idx in 0..self.params.len() {
            let param = self.params[idx];
            if arg[param].is_none() && arg_pre[param].is_some() {
                self.unify_new_arg(action, node, arg, param, remain, arg_pre, static_fact);
                return;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn unify_new_arg(
        &mut self,
        action: &PrepAction,
        node: usize,
        arg: &mut Vec<Option<ObjId>>,
        param: usize,
        remain: usize,
        arg_pre: &[Option<ObjId>],
        static_fact: bool,
    ) {
        arg[param] = arg_pre[param];
        let child = self.add_child(node, param, arg[param].unwrap());
        if static_fact {
            self.nodes[child].static_arg = true;
        }
        if remain > 1 {
            self.unify_new(action, child, arg, remain - 1, arg_pre, static_fact);
        } else {
            self.unify_pre(child, arg);
        }
        arg[param] = None;
    }

    fn unify_pre(&mut self, node: usize, arg: &mut Vec<Option<ObjId>>) {
        self.nodes[node].pre_unified += 1;
        self.nodes[node].flag_pre_unified = true;
        self.propagate_pre(node, arg);
    }

    fn propagate_pre(&mut self, node: usize, arg: &mut Vec<Option<ObjId>>) {
        // Once every precondition atom of the group is matched along this
        // path, the accumulated binding becomes a candidate tuple. This may
        // happen above a leaf.
        if self.nodes[node].pre_unified == self.pre_size {
            self.args.push(arg.clone());
            self.nodes[node].blocked = true;
            return;
        }

        let children = self.nodes[node].children.clone();
        for ch in children {
            self.nodes[ch].pre_unified += 1;
            let param = self.nodes[ch].param;
            if arg[param].is_none() {
                arg[param] = Some(self.nodes[ch].obj);
                self.propagate_pre(ch, arg);
                arg[param] = None;
            } else {
                self.propagate_pre(ch, arg);
            }
        }
    }

    /// Called once all static facts are unified: prunes branches opened by
    /// incomplete static bindings and freezes the static skeleton.
    pub fn block_static(&mut self) {
        self.block_static_rec(0);
        self.remove_incomplete_static(0);
        // If the action has static preconditions they are all in place now,
        // so later non-static unification may not invent new static
        // bindings below the root.
        if self.pre_static_size > 0 {
            self.nodes[0].blocked = true;
        }
    }

    fn block_static_rec(&mut self, node: usize) {
        let children = self.nodes[node].children.clone();
        let mut static_params: Vec<usize> = Vec::new();
        for &ch in &children {
            if self.nodes[ch].static_arg {
                static_params.push(self.nodes[ch].param);
            }
        }
        let mut kept = Vec::with_capacity(children.len());
        for &ch in &children {
            let n = &self.nodes[ch];
            if n.static_arg || !static_params.contains(&n.param) {
                kept.push(ch);
            }
        }
        self.nodes[node].children = kept;

        let children = self.nodes[node].children.clone();
        for ch in children {
            self.block_static_rec(ch);
        }
        if !self.nodes[node].children.is_empty() {
            self.nodes[node].blocked = true;
        }
    }

    /// Removes leaves that exist only because of a static binding that was
    /// never completed to a full match. Returns true if `node` itself
    /// should be removed.
    fn remove_incomplete_static(&mut self, node: usize) -> bool {
        let children = self.nodes[node].children.clone();
        let mut surviving = Vec::with_capacity(children.len());
        for ch in children {
            if !self.remove_incomplete_static(ch) {
                surviving.push(ch);
            }
        }
        self.nodes[node].children = surviving;

        self.nodes[node].children.is_empty()
            && self.nodes[node].pre_unified != self.pre_static_size
            && self.nodes[node].static_arg
    }
}
