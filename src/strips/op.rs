//! Ground STRIPS operators.

use crate::strips::FactId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondEff {
    pub pre: BTreeSet<FactId>,
    pub add_eff: BTreeSet<FactId>,
    pub del_eff: BTreeSet<FactId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripsOp {
    pub name: String,
    pub pre: BTreeSet<FactId>,
    pub add_eff: BTreeSet<FactId>,
    pub del_eff: BTreeSet<FactId>,
    pub cost: i32,
    pub cond_eff: Vec<CondEff>,
}

impl StripsOp {
    pub fn new(name: String) -> Self {
        Self {
            name,
            pre: BTreeSet::new(),
            add_eff: BTreeSet::new(),
            del_eff: BTreeSet::new(),
            cost: 1,
            cond_eff: Vec::new(),
        }
    }

    /// Enforces the operator invariants: `add ∩ del = ∅` (an add wins),
    /// `pre ∩ add = ∅` (redundant adds dropped), and `del ⊆ pre`.
    pub fn normalize(&mut self) {
        self.del_eff = &self.del_eff - &self.add_eff;
        self.add_eff = &self.add_eff - &self.pre;
        self.pre.extend(self.del_eff.iter().copied());
    }

    pub fn has_effect(&self) -> bool {
        !self.add_eff.is_empty() || !self.del_eff.is_empty()
    }

    /// Attaches `other` as a conditional effect; its residual precondition
    /// must already be reduced against this operator's precondition.
    pub fn add_cond_eff(&mut self, other: &StripsOp) {
        self.cond_eff.push(CondEff {
            pre: other.pre.clone(),
            add_eff: other.add_eff.clone(),
            del_eff: other.del_eff.clone(),
        });
    }

    /// Folds the effects of `other` directly into this operator.
    pub fn merge_effects(&mut self, other: &StripsOp) {
        self.add_eff.extend(other.add_eff.iter().copied());
        self.del_eff.extend(other.del_eff.iter().copied());
        self.normalize();
    }

    /// Rewrites fact references after a fact removal; returns false if the
    /// operator lost all effects and should be dropped.
    pub fn remap_facts(&mut self, remap: &[Option<FactId>]) -> bool {
        let map = |set: &BTreeSet<FactId>| -> BTreeSet<FactId> {
            set.iter().filter_map(|&f| remap[f]).collect()
        };
        self.pre = map(&self.pre);
        self.add_eff = map(&self.add_eff);
        self.del_eff = map(&self.del_eff);
        self.cond_eff.retain_mut(|ce| {
            ce.pre = map(&ce.pre);
            ce.add_eff = map(&ce.add_eff);
            ce.del_eff = map(&ce.del_eff);
            !ce.add_eff.is_empty() || !ce.del_eff.is_empty()
        });
        self.has_effect() || !self.cond_eff.is_empty()
    }

    /// Rewrites fact references through a total renumbering.
    pub fn permute_facts(&mut self, remap: &[FactId]) {
        let map = |set: &BTreeSet<FactId>| -> BTreeSet<FactId> {
            set.iter().map(|&f| remap[f]).collect()
        };
        self.pre = map(&self.pre);
        self.add_eff = map(&self.add_eff);
        self.del_eff = map(&self.del_eff);
        for ce in &mut self.cond_eff {
            ce.pre = map(&ce.pre);
            ce.add_eff = map(&ce.add_eff);
            ce.del_eff = map(&ce.del_eff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[FactId]) -> BTreeSet<FactId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn normalize_enforces_invariants() {
        let mut op = StripsOp::new("op".into());
        op.pre = set(&[0, 1]);
        op.add_eff = set(&[1, 2, 3]);
        op.del_eff = set(&[0, 3]);
        op.normalize();

        assert!(op.pre.intersection(&op.add_eff).next().is_none());
        assert!(op.add_eff.intersection(&op.del_eff).next().is_none());
        assert!(op.del_eff.is_subset(&op.pre));
        // fact 3 was both added and deleted: the add wins
        assert!(op.add_eff.contains(&3));
        assert!(!op.del_eff.contains(&3));
        // fact 1 was already required, so adding it is redundant
        assert!(!op.add_eff.contains(&1));
    }

    #[test]
    fn remap_drops_operators_without_effects() {
        let mut op = StripsOp::new("op".into());
        op.pre = set(&[0]);
        op.add_eff = set(&[1]);
        let remap = vec![Some(0), None];
        assert!(!op.remap_facts(&remap));
    }
}
