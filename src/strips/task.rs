//! The assembled propositional planning task.

use crate::pddl::{Name, Predicates};
use crate::strips::{FactId, Facts, StripsOp};
use std::collections::BTreeSet;
use std::io::{self, Write};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct StripsTask {
    pub domain_name: Name,
    pub problem_name: Name,
    pub facts: Facts,
    pub ops: Vec<StripsOp>,
    pub init: BTreeSet<FactId>,
    pub goal: BTreeSet<FactId>,
    pub goal_is_unreachable: bool,
    pub has_cond_eff: bool,
}

impl StripsTask {
    /// Removes the given facts, renumbering everything densely. Operators
    /// left without any effect are deleted.
    pub fn remove_facts(&mut self, rm: &BTreeSet<FactId>) {
        if rm.is_empty() {
            return;
        }
        let remap = self.facts.remove_facts(rm);
        self.ops.retain_mut(|op| op.remap_facts(&remap));
        self.init = self.init.iter().filter_map(|&f| remap[f]).collect();
        self.goal = self.goal.iter().filter_map(|&f| remap[f]).collect();
        self.has_cond_eff = self.ops.iter().any(|op| !op.cond_eff.is_empty());
    }

    pub fn remove_ops(&mut self, rm: &BTreeSet<usize>) {
        if rm.is_empty() {
            return;
        }
        let mut idx = 0;
        self.ops.retain(|_| {
            let keep = !rm.contains(&idx);
            idx += 1;
            keep
        });
    }

    /// Purges static facts that no operator adds or deletes (§ static-fact
    /// purge): they are satisfied once and forever by the initial state.
    /// A purged goal fact missing from the initial state makes the goal
    /// unreachable.
    pub fn remove_static_facts(&mut self, preds: &Predicates) {
        let mut touched: BTreeSet<FactId> = BTreeSet::new();
        for op in &self.ops {
            touched.extend(op.add_eff.iter().copied());
            touched.extend(op.del_eff.iter().copied());
            for ce in &op.cond_eff {
                touched.extend(ce.add_eff.iter().copied());
                touched.extend(ce.del_eff.iter().copied());
            }
        }

        let mut rm: BTreeSet<FactId> = BTreeSet::new();
        for fact in self.facts.iter() {
            let Some((pred, _)) = fact.ground_atom else {
                continue;
            };
            if !preds.get(pred).is_static() || touched.contains(&fact.id) {
                continue;
            }
            if self.goal.contains(&fact.id) && !self.init.contains(&fact.id) {
                self.goal_is_unreachable = true;
            }
            rm.insert(fact.id);
        }

        info!(removed = rm.len(), "purged static facts");
        self.remove_facts(&rm);
    }

    /// Replaces the operator set with the canonical unsolvable skeleton.
    /// Facts, initial state and goal are kept for diagnostics.
    pub fn make_unsolvable(&mut self) {
        self.ops.clear();
        self.has_cond_eff = false;
        self.goal_is_unreachable = true;
    }

    /// Textual dump of the ground task: one line per fact, then one block
    /// per operator with precondition, add, delete, cost and conditional
    /// effects.
    pub fn write_dump(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "facts: {}", self.facts.len())?;
        for fact in self.facts.iter() {
            writeln!(w, "{}", fact.name)?;
        }
        writeln!(w, "operators: {}", self.ops.len())?;
        for op in &self.ops {
            writeln!(w, "{}", op.name)?;
            writeln!(w, "pre: {:?}", self.set_vec(&op.pre))?;
            writeln!(w, "add: {:?}", self.set_vec(&op.add_eff))?;
            writeln!(w, "del: {:?}", self.set_vec(&op.del_eff))?;
            writeln!(w, "cost: {}", op.cost)?;
            for ce in &op.cond_eff {
                writeln!(
                    w,
                    "cond-eff: ({:?}, {:?}, {:?})",
                    self.set_vec(&ce.pre),
                    self.set_vec(&ce.add_eff),
                    self.set_vec(&ce.del_eff)
                )?;
            }
        }
        writeln!(w, "init: {:?}", self.set_vec(&self.init))?;
        writeln!(w, "goal: {:?}", self.set_vec(&self.goal))?;
        Ok(())
    }

    fn set_vec(&self, set: &BTreeSet<FactId>) -> Vec<FactId> {
        set.iter().copied().collect()
    }

    /// Convenience lookup of a fact id by its printable name.
    pub fn fact_by_name(&self, name: &str) -> Option<FactId> {
        self.facts.iter().find(|f| f.name == name).map(|f| f.id)
    }

    /// Convenience lookup of an operator index by name.
    pub fn op_by_name(&self, name: &str) -> Option<usize> {
        self.ops.iter().position(|o| o.name == name)
    }

    /// Predicate a fact was grounded from, if it has a ground atom.
    pub fn fact_pred(&self, fact: FactId) -> Option<crate::pddl::PredId> {
        self.facts.get(fact).ground_atom.map(|(p, _)| p)
    }

    pub fn dump_string(&self) -> String {
        let mut buf = Vec::new();
        self.write_dump(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("dump is valid utf-8")
    }

    /// Sanity helper used by tests and debug assertions.
    pub fn check_invariants(&self) -> bool {
        self.ops.iter().all(|op| {
            op.pre.intersection(&op.add_eff).next().is_none()
                && op.add_eff.intersection(&op.del_eff).next().is_none()
                && op.del_eff.is_subset(&op.pre)
        }) && self
            .init
            .iter()
            .chain(self.goal.iter())
            .all(|&f| f < self.facts.len())
    }

    #[allow(dead_code)]
    pub(crate) fn op_names(&self) -> Vec<&str> {
        self.ops.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn sort_ops(&mut self) {
        self.ops.sort_by(|a, b| a.name.cmp(&b.name).then(a.cost.cmp(&b.cost)));
    }

    /// Removes operators identical in everything including name.
    pub fn dedup_ops(&mut self) {
        self.sort_ops();
        self.ops.dedup();
    }
}
