//! Builds the typed first-order model from the domain and problem ASTs and
//! drives whole-model normalisation.

use crate::error::{Error, Result};
use crate::lisp::{Keyword, Node};
use crate::pddl::normalize::{
    deconflict_eff, deconflict_pre, normalize_action, normalize_cond, split_action, InitIndex,
    NormEnv,
};
use crate::pddl::{
    find_param, Action, Cond, CondArg, CondAtom, FuncOp, Name, Objects, Param, Params, PredId,
    Predicates, Requirements, TypeId, Types, OBJECT_TYPE,
};
use itertools::Itertools;
use smallvec::SmallVec;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct PddlConfig {
    /// Behave as if every requirement flag was declared.
    pub force_adl: bool,
}

/// The typed first-order planning description: domain plus problem.
#[derive(Debug, Clone)]
pub struct Pddl {
    pub domain_name: Name,
    pub problem_name: Name,
    pub requirements: Requirements,
    pub types: Types,
    pub objects: Objects,
    pub preds: Predicates,
    pub funcs: Predicates,
    pub actions: Vec<Action>,
    /// Conjunction of grounded atoms and function assignments.
    pub init: Vec<Cond>,
    pub goal: Cond,
    /// True iff the problem declares `(:metric minimize (total-cost))`.
    pub metric: bool,
    goal_params: Params,
    normalized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondCtx {
    Pre,
    Eff,
    Goal,
}

impl Pddl {
    pub fn from_lisp(domain: &Node, problem: &Node, cfg: &PddlConfig) -> Result<Pddl> {
        let mut pddl = Pddl {
            domain_name: Name::default(),
            problem_name: Name::default(),
            requirements: if cfg.force_adl {
                Requirements::all()
            } else {
                Requirements::default()
            },
            types: Types::default(),
            objects: Objects::default(),
            preds: Predicates::default(),
            funcs: Predicates::default(),
            actions: Vec::new(),
            init: Vec::new(),
            goal: Cond::TRUE,
            metric: false,
            goal_params: Vec::new(),
            normalized: false,
        };
        pddl.preds.add_eq(OBJECT_TYPE);

        pddl.parse_domain(domain, cfg)?;
        pddl.parse_problem(problem)?;
        pddl.types.seal();
        pddl.set_pred_read_write();

        info!(
            domain = %pddl.domain_name,
            problem = %pddl.problem_name,
            types = pddl.types.len(),
            objects = pddl.objects.len(),
            predicates = pddl.preds.len(),
            actions = pddl.actions.len(),
            "parsed planning description"
        );
        Ok(pddl)
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Grounded initial atoms indexed for static evaluation.
    pub fn init_index(&self) -> InitIndex {
        let mut index = InitIndex::default();
        for c in &self.init {
            if let Cond::Atom(a) = c {
                if !a.neg {
                    index.insert(a);
                }
            }
        }
        index
    }

    pub fn init_atoms(&self) -> impl Iterator<Item = &CondAtom> {
        self.init.iter().filter_map(|c| match c {
            Cond::Atom(a) if !a.neg => Some(a),
            _ => None,
        })
    }

    pub fn init_assigns(&self) -> impl Iterator<Item = &FuncOp> {
        self.init.iter().filter_map(|c| match c {
            Cond::Assign(op) => Some(op),
            _ => None,
        })
    }

    /* ----- domain ----- */

    fn parse_domain(&mut self, node: &Node, cfg: &PddlConfig) -> Result<()> {
        self.check_define(node, Keyword::Domain)?;
        let name_node = &node.children[1];
        self.domain_name = Name::new(
            name_node
                .children
                .get(1)
                .and_then(|c| c.token_value())
                .ok_or_else(|| Error::structural(name_node.line, "missing domain name"))?,
        );

        if let Some(req) = node.child_with_head(Keyword::Requirements) {
            let declared = Requirements::parse(req)?;
            if !cfg.force_adl {
                self.requirements = declared;
            }
        }
        if let Some(types) = node.child_with_head(Keyword::Types) {
            self.parse_types(types)?;
        }
        if let Some(constants) = node.child_with_head(Keyword::Constants) {
            self.parse_objects_section(constants, true)?;
        }
        if let Some(preds) = node.child_with_head(Keyword::Predicates) {
            self.parse_predicates(preds)?;
        }
        if let Some(funcs) = node.child_with_head(Keyword::Functions) {
            self.parse_functions(funcs)?;
        }
        for child in &node.children {
            if !child.is_token() && child.head_kw() == Some(Keyword::Action) {
                self.parse_action(child)?;
            }
        }
        Ok(())
    }

    fn check_define(&self, node: &Node, which: Keyword) -> Result<()> {
        let ok = node.head_kw() == Some(Keyword::Define)
            && node
                .children
                .get(1)
                .map(|c| c.head_kw() == Some(which))
                .unwrap_or(false);
        if !ok {
            return Err(Error::structural(
                node.line,
                format!("expected (define ({} ...) ...)", which),
            ));
        }
        Ok(())
    }

    fn parse_types(&mut self, node: &Node) -> Result<()> {
        let entries = parse_typed_list(&node.children[1..], &mut self.types)?;
        for entry in entries {
            self.types.add(entry.name, entry.type_);
        }
        Ok(())
    }

    fn parse_objects_section(&mut self, node: &Node, is_constant: bool) -> Result<()> {
        let mut plain: Vec<&Node> = Vec::new();
        for child in node.children.iter().skip(1) {
            if !child.is_token() && child.head_kw() == Some(Keyword::Private) {
                self.parse_private_objects(child, is_constant)?;
            } else {
                plain.push(child);
            }
        }
        let plain: Vec<Node> = plain.into_iter().cloned().collect();
        for entry in parse_typed_list(&plain, &mut self.types)? {
            let (id, _) = self.objects.add(entry.name, entry.type_, is_constant);
            self.types.add_object(id, entry.type_)?;
        }
        Ok(())
    }

    fn parse_private_objects(&mut self, node: &Node, is_constant: bool) -> Result<()> {
        let owner_node = node.children.get(1).ok_or_else(|| {
            Error::structural(node.line, "(:private ...) requires an owner name")
        })?;
        let owner_name = owner_node
            .token_value()
            .ok_or_else(|| Error::structural(owner_node.line, "invalid owner name"))?;
        let owner = self.objects.find(owner_name);
        let rest: Vec<Node> = node.children[2..].to_vec();
        for entry in parse_typed_list(&rest, &mut self.types)? {
            let (id, _) = self.objects.add(entry.name, entry.type_, is_constant);
            self.types.add_object(id, entry.type_)?;
            self.objects.mark_private(id, owner);
        }
        Ok(())
    }

    fn parse_predicates(&mut self, node: &Node) -> Result<()> {
        for child in node.children.iter().skip(1) {
            if child.is_token() {
                return Err(Error::structural(child.line, "invalid predicate definition"));
            }
            let (name, param_types) = self.parse_pred_signature(child)?;
            if self.preds.contains(&name) {
                return Err(Error::structural(
                    child.line,
                    format!("duplicated declaration of predicate {}", name),
                ));
            }
            self.preds.add(name, param_types);
        }
        Ok(())
    }

    fn parse_functions(&mut self, node: &Node) -> Result<()> {
        let mut i = 1;
        while i < node.children.len() {
            let child = &node.children[i];
            if child.is_token() {
                // a trailing "- number" marker after a block of functions
                if child.token_value() == Some("-") {
                    i += 2;
                    continue;
                }
                return Err(Error::structural(child.line, "invalid function definition"));
            }
            let (name, param_types) = self.parse_pred_signature(child)?;
            if self.funcs.contains(&name) {
                return Err(Error::structural(
                    child.line,
                    format!("duplicated declaration of function {}", name),
                ));
            }
            self.funcs.add(name, param_types);
            i += 1;
        }
        Ok(())
    }

    fn parse_pred_signature(&mut self, node: &Node) -> Result<(Name, Vec<TypeId>)> {
        let head = node.children.first().and_then(|c| c.token_value());
        let name = Name::new(head.ok_or_else(|| {
            Error::structural(node.line, "predicate definition misses its name")
        })?);
        let vars: Vec<Node> = node.children[1..].to_vec();
        let param_types = parse_typed_list(&vars, &mut self.types)?
            .into_iter()
            .map(|e| e.type_)
            .collect();
        Ok((name, param_types))
    }

    fn parse_action(&mut self, node: &Node) -> Result<()> {
        let name_node = node.children.get(1).ok_or_else(|| {
            Error::structural(node.line, "(:action ...) misses its name")
        })?;
        let name = Name::new(
            name_node
                .token_value()
                .ok_or_else(|| Error::structural(name_node.line, "invalid action name"))?,
        );

        let mut params: Params = Vec::new();
        let mut declared = 0;
        let mut pre = Cond::TRUE;
        let mut eff = Cond::And(Vec::new());

        let mut i = 2;
        while i < node.children.len() {
            let key = &node.children[i];
            let value = node.children.get(i + 1).ok_or_else(|| {
                Error::structural(key.line, "dangling keyword in action definition")
            })?;
            match key.kw {
                Some(Keyword::Parameters) => {
                    for entry in parse_typed_list(&value.children, &mut self.types)? {
                        params.push(Param::new(entry.name, entry.type_));
                    }
                    declared = params.len();
                }
                Some(Keyword::Precondition) => {
                    pre = self.parse_cond(value, &mut params, CondCtx::Pre)?;
                }
                Some(Keyword::Effect) => {
                    eff = self.parse_cond(value, &mut params, CondCtx::Eff)?;
                }
                _ => {
                    return Err(Error::structural(
                        key.line,
                        format!("unexpected token {} in action definition", key),
                    ))
                }
            }
            i += 2;
        }

        // quantifier variables appended while parsing the conditions are
        // not declared parameters
        let mut action = Action::new(name, params, pre, eff);
        action.declared_params = declared;
        self.actions.push(action);
        Ok(())
    }

    /* ----- problem ----- */

    fn parse_problem(&mut self, node: &Node) -> Result<()> {
        self.check_define(node, Keyword::Problem)?;
        let name_node = &node.children[1];
        self.problem_name = Name::new(
            name_node
                .children
                .get(1)
                .and_then(|c| c.token_value())
                .ok_or_else(|| Error::structural(name_node.line, "missing problem name"))?,
        );

        if let Some(dref) = node.child_with_head(Keyword::DomainRef) {
            let named = dref.children.get(1).and_then(|c| c.token_value());
            if named != Some(self.domain_name.as_str()) {
                return Err(Error::structural(
                    dref.line,
                    "problem refers to a different domain",
                ));
            }
        }
        if let Some(objects) = node.child_with_head(Keyword::Objects) {
            self.parse_objects_section(objects, false)?;
        }
        let init = node
            .child_with_head(Keyword::Init)
            .ok_or_else(|| Error::structural(node.line, "missing (:init ...) section"))?;
        self.parse_init(init)?;
        let goal = node
            .child_with_head(Keyword::Goal)
            .ok_or_else(|| Error::structural(node.line, "missing (:goal ...) section"))?;
        let goal_cond = goal.children.get(1).ok_or_else(|| {
            Error::structural(goal.line, "empty (:goal) section")
        })?;
        let mut goal_params = std::mem::take(&mut self.goal_params);
        self.goal = self.parse_cond(goal_cond, &mut goal_params, CondCtx::Goal)?;
        self.goal_params = goal_params;

        if let Some(metric) = node.child_with_head(Keyword::Metric) {
            self.parse_metric(metric)?;
        }
        Ok(())
    }

    fn parse_init(&mut self, node: &Node) -> Result<()> {
        for child in node.children.iter().skip(1) {
            if child.is_token() {
                return Err(Error::structural(child.line, "invalid init element"));
            }
            if child.head_kw() == Some(Keyword::Eq) {
                let op = self.parse_init_assign(child)?;
                self.init.push(Cond::Assign(op));
                continue;
            }
            let atom = self.parse_atom(child, &Vec::new())?;
            if !atom.is_grounded() {
                return Err(Error::structural(
                    child.line,
                    "initial state atoms must be grounded",
                ));
            }
            self.preds.get_mut(atom.pred).in_init = true;
            self.init.push(Cond::Atom(atom));
        }
        Ok(())
    }

    fn parse_init_assign(&mut self, node: &Node) -> Result<FuncOp> {
        let lvalue_node = node.children.get(1).ok_or_else(|| {
            Error::structural(node.line, "function assignment misses its lvalue")
        })?;
        let value_node = node.children.get(2).and_then(|c| c.token_value());
        let value: i32 = value_node
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::structural(node.line, "invalid function value"))?;
        let lvalue = self.parse_func_atom(lvalue_node, &Vec::new())?;
        Ok(FuncOp {
            lvalue,
            value,
            fvalue: None,
        })
    }

    fn parse_metric(&mut self, node: &Node) -> Result<()> {
        let spec = node.children.get(1).and_then(|c| c.kw);
        let target = node
            .children
            .get(2)
            .and_then(|c| c.children.first())
            .and_then(|c| c.token_value());
        if spec != Some(Keyword::Minimize) || target != Some("total-cost") {
            return Err(Error::semantic(
                "only (:metric minimize (total-cost)) is supported",
            ));
        }
        self.metric = true;
        Ok(())
    }

    /* ----- conditions ----- */

    fn parse_cond(&mut self, node: &Node, params: &mut Params, ctx: CondCtx) -> Result<Cond> {
        if node.is_token() {
            return Err(Error::structural(node.line, "expected a condition list"));
        }
        match node.head_kw() {
            Some(Keyword::And) => {
                let parts = node.children[1..]
                    .iter()
                    .map(|c| self.parse_cond(c, params, ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Cond::And(parts))
            }
            Some(Keyword::Or) => {
                self.require(Requirements::DISJUNCTIVE_PRE, node.line, "or")?;
                if ctx == CondCtx::Eff {
                    return Err(Error::semantic("disjunction in effect"));
                }
                let parts = node.children[1..]
                    .iter()
                    .map(|c| self.parse_cond(c, params, ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Cond::Or(parts))
            }
            Some(Keyword::Not) => {
                let inner = node.children.get(1).ok_or_else(|| {
                    Error::structural(node.line, "(not ...) misses its argument")
                })?;
                let inner = self.parse_cond(inner, params, ctx)?;
                if let Cond::Atom(a) = &inner {
                    if ctx != CondCtx::Eff && !self.preds.is_eq(a.pred) {
                        self.require(Requirements::NEGATIVE_PRE, node.line, "not")?;
                    }
                }
                inner.negate()
            }
            Some(Keyword::Imply) => {
                self.require(Requirements::DISJUNCTIVE_PRE, node.line, "imply")?;
                let left = node.children.get(1).ok_or_else(|| {
                    Error::structural(node.line, "(imply ...) misses its left side")
                })?;
                let right = node.children.get(2).ok_or_else(|| {
                    Error::structural(node.line, "(imply ...) misses its right side")
                })?;
                Ok(Cond::Imply(
                    Box::new(self.parse_cond(left, params, ctx)?),
                    Box::new(self.parse_cond(right, params, ctx)?),
                ))
            }
            Some(Keyword::Exists) | Some(Keyword::Forall) => {
                self.parse_quantifier(node, params, ctx)
            }
            Some(Keyword::When) => {
                if ctx != CondCtx::Eff {
                    return Err(Error::semantic(
                        "(when ...) is only allowed inside effects",
                    ));
                }
                self.require(Requirements::CONDITIONAL_EFF, node.line, "when")?;
                let pre = node.children.get(1).ok_or_else(|| {
                    Error::structural(node.line, "(when ...) misses its condition")
                })?;
                let eff = node.children.get(2).ok_or_else(|| {
                    Error::structural(node.line, "(when ...) misses its effect")
                })?;
                Ok(Cond::When(
                    Box::new(self.parse_cond(pre, params, CondCtx::Pre)?),
                    Box::new(self.parse_cond(eff, params, CondCtx::Eff)?),
                ))
            }
            Some(Keyword::Eq) => {
                self.require(Requirements::EQUALITY, node.line, "=")?;
                let atom = self.parse_atom(node, params)?;
                Ok(Cond::Atom(atom))
            }
            Some(Keyword::Increase) => {
                if ctx != CondCtx::Eff {
                    return Err(Error::semantic(
                        "(increase ...) is only allowed inside effects",
                    ));
                }
                self.parse_increase(node, params)
            }
            _ => Ok(Cond::Atom(self.parse_atom(node, params)?)),
        }
    }

    fn parse_quantifier(&mut self, node: &Node, params: &mut Params, ctx: CondCtx) -> Result<Cond> {
        let is_forall = node.head_kw() == Some(Keyword::Forall);
        if is_forall {
            let req = if ctx == CondCtx::Eff {
                Requirements::CONDITIONAL_EFF
            } else {
                Requirements::UNIVERSAL_PRE
            };
            self.require(req, node.line, "forall")?;
        } else if ctx == CondCtx::Eff {
            return Err(Error::semantic("(exists ...) is not allowed in effects"));
        } else {
            self.require(Requirements::EXISTENTIAL_PRE, node.line, "exists")?;
        }

        let vars = node.children.get(1).ok_or_else(|| {
            Error::structural(node.line, "quantifier misses its variable list")
        })?;
        let body = node.children.get(2).ok_or_else(|| {
            Error::structural(node.line, "quantifier misses its body")
        })?;

        let scope = params.len();
        let entries = parse_typed_list(&vars.children, &mut self.types)?;
        if entries.is_empty() {
            return Err(Error::structural(vars.line, "empty quantifier variable list"));
        }
        let mut indices = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut param = Param::new(entry.name, entry.type_);
            param.inherit = Some(scope);
            indices.push(params.len());
            params.push(param);
        }

        let body = self.parse_cond(body, params, ctx)?;
        // innermost variable first so nested scopes wrap correctly
        let mut cond = body;
        for &idx in indices.iter().rev() {
            cond = if is_forall {
                Cond::Forall(idx, Box::new(cond))
            } else {
                Cond::Exists(idx, Box::new(cond))
            };
        }
        Ok(cond)
    }

    fn parse_increase(&mut self, node: &Node, params: &Params) -> Result<Cond> {
        let lvalue_node = node.children.get(1).ok_or_else(|| {
            Error::structural(node.line, "(increase ...) misses its lvalue")
        })?;
        let lvalue = self.parse_func_atom(lvalue_node, params)?;
        if self.funcs.get(lvalue.pred).name != "total-cost" {
            return Err(Error::semantic(
                "only (increase (total-cost) ...) is supported in effects",
            ));
        }
        let value_node = node.children.get(2).ok_or_else(|| {
            Error::structural(node.line, "(increase ...) misses its value")
        })?;
        if let Some(text) = value_node.token_value() {
            let value: i32 = text
                .parse()
                .map_err(|_| Error::structural(value_node.line, "invalid cost value"))?;
            Ok(Cond::Increase(FuncOp {
                lvalue,
                value,
                fvalue: None,
            }))
        } else {
            let fvalue = self.parse_func_atom(value_node, params)?;
            Ok(Cond::Increase(FuncOp {
                lvalue,
                value: 0,
                fvalue: Some(fvalue),
            }))
        }
    }

    fn parse_atom(&mut self, node: &Node, params: &Params) -> Result<CondAtom> {
        let head = node.children.first().ok_or_else(|| {
            Error::structural(node.line, "empty atom")
        })?;
        let pred_name = head
            .token_value()
            .ok_or_else(|| Error::structural(head.line, "invalid predicate name"))?;
        let pred = self.preds.find(pred_name).ok_or_else(|| {
            Error::structural(head.line, format!("unknown predicate {}", pred_name))
        })?;
        let args = self.parse_atom_args(&node.children[1..], params)?;
        if args.len() != self.preds.get(pred).arity() {
            return Err(Error::structural(
                node.line,
                format!("wrong number of arguments for predicate {}", pred_name),
            ));
        }
        Ok(CondAtom::new(pred, args))
    }

    fn parse_func_atom(&mut self, node: &Node, params: &Params) -> Result<CondAtom> {
        let head = node.children.first().ok_or_else(|| {
            Error::structural(node.line, "empty function term")
        })?;
        let func_name = head
            .token_value()
            .ok_or_else(|| Error::structural(head.line, "invalid function name"))?;
        let func = self.funcs.find(func_name).ok_or_else(|| {
            Error::structural(head.line, format!("unknown function {}", func_name))
        })?;
        let args = self.parse_atom_args(&node.children[1..], params)?;
        Ok(CondAtom::new(func, args))
    }

    fn parse_atom_args(
        &mut self,
        nodes: &[Node],
        params: &Params,
    ) -> Result<SmallVec<[CondArg; 5]>> {
        let mut args = SmallVec::new();
        for node in nodes {
            let text = node
                .token_value()
                .ok_or_else(|| Error::structural(node.line, "invalid atom argument"))?;
            if text.starts_with('?') {
                let idx = find_param(params, text).ok_or_else(|| {
                    Error::structural(node.line, format!("unknown variable {}", text))
                })?;
                args.push(CondArg::Param(idx));
            } else {
                let obj = self.objects.find(text).ok_or_else(|| {
                    Error::structural(node.line, format!("unknown object {}", text))
                })?;
                args.push(CondArg::Obj(obj));
            }
        }
        Ok(args)
    }

    fn require(&self, req: Requirements, line: u32, what: &str) -> Result<()> {
        if !self.requirements.contains(req) {
            return Err(Error::structural(
                line,
                format!("{} used without declaring the matching requirement", what),
            ));
        }
        Ok(())
    }

    /* ----- read/write flags ----- */

    fn set_pred_read_write(&mut self) {
        let mut read: Vec<PredId> = Vec::new();
        let mut write: Vec<PredId> = Vec::new();
        for action in &self.actions {
            action.pre.visit_atoms(&mut |a| read.push(a.pred));
            // when-conditions are reads, their bodies writes
            collect_eff_read_write(&action.eff, &mut read, &mut write);
        }
        self.goal.visit_atoms(&mut |a| read.push(a.pred));
        for id in read {
            if id < self.preds.len() {
                self.preds.get_mut(id).read = true;
            }
        }
        for id in write {
            if id < self.preds.len() {
                self.preds.get_mut(id).write = true;
            }
        }
    }

    /* ----- normalisation ----- */

    /// Normalises the whole model per the pipeline contract: actions with
    /// empty parameter extents removed, conditions rewritten, disjunctive
    /// actions split, negation twins compiled in, unreachable actions
    /// removed.
    pub fn normalize(&mut self) -> Result<()> {
        // Only declared parameters rule an action out; a quantifier over an
        // empty extent collapses to a boolean instead.
        self.actions.retain(|a| {
            a.params
                .iter()
                .take(a.declared_params)
                .all(|p| !self.types.objs_by_type(p.type_).is_empty())
        });

        let init = self.init_index();
        {
            let env = NormEnv {
                types: &self.types,
                preds: &self.preds,
                init: &init,
                eval_static: true,
            };
            for action in &mut self.actions {
                normalize_action(action, &env)?;
            }
            let actions = std::mem::take(&mut self.actions);
            for action in actions {
                self.actions.extend(split_action(action, &env)?);
            }
        }
        self.remove_irrelevant_actions();

        let goal = std::mem::replace(&mut self.goal, Cond::TRUE);
        let init_index = self.init_index();
        let env = NormEnv {
            types: &self.types,
            preds: &self.preds,
            init: &init_index,
            // goal atoms over static predicates stay as atoms so the
            // ground task can report which goal fact is unreachable
            eval_static: false,
        };
        self.goal = normalize_cond(goal, &env, &self.goal_params)?;

        self.compile_out_negative_preconditions()?;
        self.remove_irrelevant_actions();
        loop {
            self.reset_pred_read_write();
            if !self.remove_unreachable_actions() {
                break;
            }
        }

        for action in &mut self.actions {
            action.truncate_quantifier_params();
        }
        self.normalized = true;

        info!(
            actions = self.actions.len(),
            predicates = self.preds.len(),
            "normalized planning description"
        );
        Ok(())
    }

    fn remove_irrelevant_actions(&mut self) {
        self.actions.retain_mut(|a| {
            let pre = std::mem::replace(&mut a.pre, Cond::TRUE);
            let eff = std::mem::replace(&mut a.eff, Cond::TRUE);
            a.pre = deconflict_pre(pre);
            a.eff = deconflict_eff(eff);
            if matches!(a.pre, Cond::Bool(false)) {
                return false;
            }
            !a.eff.add_effects().is_empty() || !a.eff.del_effects().is_empty()
        });
    }

    fn reset_pred_read_write(&mut self) {
        for id in 0..self.preds.len() {
            let p = self.preds.get_mut(id);
            p.read = false;
            p.write = false;
        }
        self.set_pred_read_write();
    }

    fn remove_unreachable_actions(&mut self) -> bool {
        let preds = &self.preds;
        let types = &self.types;
        let before = self.actions.len();
        self.actions.retain(|a| {
            let mut unreachable = false;
            a.pre.visit_atoms(&mut |atom| {
                let pred = preds.get(atom.pred);
                if !preds.is_eq(atom.pred) && pred.is_static() && !pred.in_init && !atom.neg {
                    unreachable = true;
                }
            });
            if unreachable {
                return false;
            }
            // inequality over singleton-extent parameters can be decided now
            let mut unsat = false;
            a.pre.visit_atoms(&mut |atom| {
                if !atom.neg || !preds.is_eq(atom.pred) {
                    return;
                }
                let resolve = |arg: &CondArg| match arg {
                    CondArg::Obj(o) => Some(*o),
                    CondArg::Param(p) => {
                        let t = a.params[*p].type_;
                        if types.num_objs(t) == 1 {
                            Some(types.objs_by_type(t)[0])
                        } else {
                            None
                        }
                    }
                };
                if let (Some(o1), Some(o2)) = (resolve(&atom.args[0]), resolve(&atom.args[1])) {
                    if o1 == o2 {
                        unsat = true;
                    }
                }
            });
            !unsat
        });
        before != self.actions.len()
    }

    /// Synthesises a negation twin for every non-static predicate occurring
    /// as a negative precondition, rewrites all occurrences, mirrors the
    /// effects, and completes the initial state.
    fn compile_out_negative_preconditions(&mut self) -> Result<()> {
        let mut negated: Vec<PredId> = Vec::new();
        fn mark(c: &Cond, negated: &mut Vec<PredId>) {
            c.visit_atoms(&mut |a| {
                if a.neg {
                    negated.push(a.pred);
                }
            });
        }
        for action in &self.actions {
            mark(&action.pre, &mut negated);
            // negative atoms inside when-conditions count as preconditions
            for eff in [&action.eff] {
                collect_when_pre_negatives(eff, &mut negated);
            }
        }
        mark(&self.goal, &mut negated);
        negated.sort_unstable();
        negated.dedup();
        negated.retain(|&p| !self.preds.get(p).is_static() && !self.preds.is_eq(p));

        for pos in negated {
            let neg = self.preds.add_neg_twin(pos);
            info!(
                predicate = %self.preds.get(pos).name,
                twin = %self.preds.get(neg).name,
                "compiling out negative preconditions"
            );
            for action in &mut self.actions {
                replace_neg_pre(&mut action.pre, pos, neg);
                replace_neg_eff(&mut action.eff, pos, neg);
            }
            replace_neg_pre(&mut self.goal, pos, neg);
            self.add_twin_init_atoms(pos, neg);
        }
        Ok(())
    }

    fn add_twin_init_atoms(&mut self, pos: PredId, neg: PredId) {
        let arity = self.preds.get(pos).arity();
        let existing: Vec<SmallVec<[CondArg; 5]>> = self
            .init_atoms()
            .filter(|a| a.pred == pos)
            .map(|a| a.args.clone())
            .collect();

        let extents: Vec<Vec<CondArg>> = self
            .preds
            .get(pos)
            .param_types
            .iter()
            .map(|&t| {
                self.types
                    .objs_by_type(t)
                    .iter()
                    .map(|&o| CondArg::Obj(o))
                    .collect()
            })
            .collect();

        let all_tuples: Vec<SmallVec<[CondArg; 5]>> = if arity == 0 {
            vec![SmallVec::new()]
        } else {
            extents
                .iter()
                .map(|ext| ext.iter().copied())
                .multi_cartesian_product()
                .map(|tuple| tuple.into_iter().collect())
                .collect()
        };

        for tuple in all_tuples {
            if existing.iter().any(|e| *e == tuple) {
                continue;
            }
            self.init.push(Cond::Atom(CondAtom::new(neg, tuple)));
        }
    }
}

fn collect_eff_read_write(c: &Cond, read: &mut Vec<PredId>, write: &mut Vec<PredId>) {
    match c {
        Cond::And(parts) | Cond::Or(parts) => {
            for p in parts {
                collect_eff_read_write(p, read, write);
            }
        }
        Cond::Forall(_, body) | Cond::Exists(_, body) => {
            collect_eff_read_write(body, read, write)
        }
        Cond::When(pre, eff) => {
            pre.visit_atoms(&mut |a| read.push(a.pred));
            collect_eff_read_write(eff, read, write);
        }
        Cond::Atom(a) => write.push(a.pred),
        Cond::Imply(l, r) => {
            collect_eff_read_write(l, read, write);
            collect_eff_read_write(r, read, write);
        }
        _ => {}
    }
}

fn collect_when_pre_negatives(c: &Cond, out: &mut Vec<PredId>) {
    match c {
        Cond::And(parts) | Cond::Or(parts) => {
            for p in parts {
                collect_when_pre_negatives(p, out);
            }
        }
        Cond::Forall(_, body) | Cond::Exists(_, body) => collect_when_pre_negatives(body, out),
        Cond::When(pre, eff) => {
            pre.visit_atoms(&mut |a| {
                if a.neg {
                    out.push(a.pred);
                }
            });
            collect_when_pre_negatives(eff, out);
        }
        _ => {}
    }
}

/// Negative preconditions on `pos` become positive atoms of the twin.
fn replace_neg_pre(c: &mut Cond, pos: PredId, neg: PredId) {
    match c {
        Cond::And(parts) | Cond::Or(parts) => {
            for p in parts {
                replace_neg_pre(p, pos, neg);
            }
        }
        Cond::Forall(_, body) | Cond::Exists(_, body) => replace_neg_pre(body, pos, neg),
        Cond::When(pre, eff) => {
            replace_neg_pre(pre, pos, neg);
            replace_neg_pre(eff, pos, neg);
        }
        Cond::Imply(l, r) => {
            replace_neg_pre(l, pos, neg);
            replace_neg_pre(r, pos, neg);
        }
        Cond::Atom(a) => {
            if a.pred == pos && a.neg {
                a.pred = neg;
                a.neg = false;
            }
        }
        _ => {}
    }
}

/// Every effect atom on `pos` gains the twin atom with flipped polarity.
fn replace_neg_eff(c: &mut Cond, pos: PredId, neg: PredId) {
    match c {
        Cond::And(parts) => {
            let mut companions = Vec::new();
            for p in parts.iter_mut() {
                match p {
                    Cond::Atom(a) if a.pred == pos => {
                        let mut twin = a.clone();
                        twin.pred = neg;
                        twin.neg = !a.neg;
                        companions.push(Cond::Atom(twin));
                    }
                    other => replace_neg_eff(other, pos, neg),
                }
            }
            parts.extend(companions);
        }
        Cond::When(pre, eff) => {
            replace_neg_pre(pre, pos, neg);
            replace_neg_eff(eff, pos, neg);
        }
        Cond::Forall(_, body) | Cond::Exists(_, body) => replace_neg_eff(body, pos, neg),
        Cond::Atom(a) if a.pred == pos => {
            let mut twin = a.clone();
            twin.pred = neg;
            twin.neg = !a.neg;
            let original = std::mem::replace(c, Cond::TRUE);
            *c = Cond::And(vec![original, Cond::Atom(twin)]);
        }
        _ => {}
    }
}

struct TypedEntry {
    name: Name,
    type_: TypeId,
}

/// Parses a PDDL typed list: `a b - t c d - (either t1 t2) e`, where
/// untyped trailing entries default to `object`. Unknown parent types are
/// registered under `object` on first sight.
fn parse_typed_list(nodes: &[Node], types: &mut Types) -> Result<Vec<TypedEntry>> {
    let mut out: Vec<TypedEntry> = Vec::new();
    let mut pending: Vec<Name> = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        let node = &nodes[i];
        if node.token_value() == Some("-") {
            let type_node = nodes.get(i + 1).ok_or_else(|| {
                Error::structural(node.line, "typed list ends with a dangling '-'")
            })?;
            let type_ = parse_type_ref(type_node, types)?;
            for name in pending.drain(..) {
                out.push(TypedEntry { name, type_ });
            }
            i += 2;
        } else {
            let text = node
                .token_value()
                .ok_or_else(|| Error::structural(node.line, "invalid typed list entry"))?;
            pending.push(Name::new(text));
            i += 1;
        }
    }
    for name in pending {
        out.push(TypedEntry {
            name,
            type_: OBJECT_TYPE,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn travel_model_counts() {
        let pddl = build_pddl(TRAVEL_DOMAIN_TEXT, TRAVEL_PROBLEM01_TEXT);
        assert_eq!(pddl.domain_name, "travel");
        assert_eq!(pddl.problem_name, "travel-01");
        // the built-in object root plus loc
        assert_eq!(pddl.types.len(), 2);
        assert_eq!(pddl.objects.len(), 3);
        // the built-in equality plus at
        assert_eq!(pddl.preds.len(), 2);
        assert_eq!(pddl.actions.len(), 1);
        assert!(pddl.is_normalized());

        let at = pddl.preds.find("at").unwrap();
        assert!(pddl.preds.get(at).write);
        assert!(!pddl.preds.get(at).is_static());
    }

    #[test]
    fn beacon_predicate_is_static() {
        let pddl = build_pddl(BEACON_DOMAIN_TEXT, BEACON_PROBLEM01_TEXT);
        let lit = pddl.preds.find("lit").unwrap();
        assert!(pddl.preds.get(lit).is_static());
        assert!(pddl.preds.get(lit).in_init);
        assert!(pddl.actions.is_empty());
    }

    #[test]
    fn workshop_negative_precondition_gets_a_twin() {
        let pddl = build_pddl(WORKSHOP_DOMAIN_TEXT, WORKSHOP_PROBLEM01_TEXT);
        assert!(pddl.metric);

        let free = pddl.preds.find("free").unwrap();
        let twin = pddl.preds.get(free).neg_of.expect("free has a twin");
        assert_eq!(pddl.preds.get(twin).name, "NOT-free");
        assert_eq!(pddl.preds.get(twin).neg_of, Some(free));

        // (free) holds initially, so no complement atom was added
        assert!(pddl.init_atoms().all(|a| a.pred != twin));

        // drop's precondition now uses the twin positively
        let drop = pddl
            .actions
            .iter()
            .find(|a| a.name == "drop")
            .expect("drop survives normalisation");
        let mut uses_twin = false;
        drop.pre.visit_atoms(&mut |a| {
            if a.pred == twin {
                uses_twin = !a.neg;
            }
        });
        assert!(uses_twin);
    }

    #[test]
    fn workshop_static_when_conditions_are_resolved() {
        let pddl = build_pddl(WORKSHOP_DOMAIN_TEXT, WORKSHOP_PROBLEM01_TEXT);
        // (fragile p2) is static and initially true, so polish-all keeps
        // only the unconditional (clean p1) effect
        let polish = pddl
            .actions
            .iter()
            .find(|a| a.name == "polish-all")
            .unwrap();
        let clean = pddl.preds.find("clean").unwrap();
        let adds = polish.eff.add_effects();
        let clean_adds: Vec<_> = adds.iter().filter(|e| e.atom.pred == clean).collect();
        assert_eq!(clean_adds.len(), 1);
        assert!(clean_adds[0].when_pre.is_none());
        assert_eq!(clean_adds[0].atom.args[0].obj(), pddl.objects.find("p1"));
    }

    #[test]
    fn workshop_dynamic_when_conditions_survive() {
        let pddl = build_pddl(WORKSHOP_DOMAIN_TEXT, WORKSHOP_PROBLEM01_TEXT);
        let shake = pddl.actions.iter().find(|a| a.name == "shake").unwrap();
        let dels = shake.eff.del_effects();
        assert_eq!(dels.len(), 2);
        assert!(dels.iter().all(|e| e.when_pre.is_some()));
    }

    #[test]
    fn disjunction_requires_its_flag() {
        let domain = parse_sexp(
            "(define (domain d) (:requirements :strips)
               (:predicates (p) (q))
               (:action a :parameters ()
                 :precondition (or (p) (q))
                 :effect (p)))",
        );
        let problem = parse_sexp(
            "(define (problem d-1) (:domain d) (:objects) (:init) (:goal (p)))",
        );
        let err = Pddl::from_lisp(&domain, &problem, &PddlConfig::default()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Structural { .. }));

        // force_adl silences the requirement checks
        let cfg = PddlConfig { force_adl: true };
        assert!(Pddl::from_lisp(&domain, &problem, &cfg).is_ok());
    }

    #[test]
    fn unknown_predicate_is_reported_with_its_line() {
        let domain = parse_sexp(
            "(define (domain d) (:requirements :strips)
               (:predicates (p))
               (:action a :parameters ()
                 :precondition (q)
                 :effect (p)))",
        );
        let problem = parse_sexp(
            "(define (problem d-1) (:domain d) (:objects) (:init) (:goal (p)))",
        );
        match Pddl::from_lisp(&domain, &problem, &PddlConfig::default()) {
            Err(crate::error::Error::Structural { line, msg }) => {
                assert_eq!(line, 4);
                assert!(msg.contains("unknown predicate q"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn disjunctive_action_is_split() {
        let domain = parse_sexp(
            "(define (domain d) (:requirements :strips :disjunctive-preconditions)
               (:predicates (p) (q) (r))
               (:action a :parameters ()
                 :precondition (or (p) (q))
                 :effect (r)))",
        );
        let problem = parse_sexp(
            "(define (problem d-1) (:domain d) (:objects) (:init (p)) (:goal (r)))",
        );
        let mut pddl = Pddl::from_lisp(&domain, &problem, &PddlConfig::default()).unwrap();
        pddl.normalize().unwrap();
        assert_eq!(pddl.actions.len(), 2);
        assert!(pddl.actions.iter().all(|a| a.name == "a"));
        assert!(pddl
            .actions
            .iter()
            .all(|a| matches!(a.pre, Cond::And(_) | Cond::Atom(_))));
    }
}

fn parse_type_ref(node: &Node, types: &mut Types) -> Result<TypeId> {
    if let Some(text) = node.token_value() {
        return Ok(match types.find(text) {
            Some(id) => id,
            None => types.add(Name::new(text), OBJECT_TYPE),
        });
    }
    if node.head_kw() != Some(Keyword::Either) {
        return Err(Error::structural(node.line, "invalid typed list type"));
    }
    let mut members = Vec::new();
    for child in node.children.iter().skip(1) {
        let text = child
            .token_value()
            .ok_or_else(|| Error::structural(child.line, "invalid either member"))?;
        members.push(match types.find(text) {
            Some(id) => id,
            None => types.add(Name::new(text), OBJECT_TYPE),
        });
    }
    if members.is_empty() {
        return Err(Error::structural(node.line, "empty (either ...) type"));
    }
    Ok(types.add_either(members))
}
