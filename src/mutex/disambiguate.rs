//! Disambiguation of fact sets against exactly-one mutex groups: if only a
//! single member of a group remains compatible with a set, it must hold in
//! every state containing the set; if none remains, the set is mutex.

use crate::mutex::{MGroups, MutexPairs};
use crate::strips::FactId;
use fixedbitset::FixedBitSet;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisambiguateResult {
    Unchanged,
    Extended,
    /// The input set cannot hold in any reachable state.
    Mutex,
}

#[derive(Debug, Clone)]
pub struct Disambiguate {
    fact_size: usize,
    /// Facts of each selected exactly-one group.
    mgroup_facts: Vec<FixedBitSet>,
    /// Per fact: groups the fact does NOT belong to.
    fact_mgroups: Vec<FixedBitSet>,
    /// Per fact: facts NOT mutex with it.
    fact_allowed: Vec<FixedBitSet>,
}

impl Disambiguate {
    /// Returns `None` when no usable group exists. Exactly-one groups of
    /// size one are skipped: they are static truths.
    pub fn new(fact_size: usize, mutex: &MutexPairs, mgroups: &MGroups) -> Option<Self> {
        let selected: Vec<&BTreeSet<FactId>> = mgroups
            .iter()
            .filter(|m| {
                m.facts.len() > 1 && (m.is_exactly_one || (m.is_fam_group && m.is_goal))
            })
            .map(|m| &m.facts)
            .collect();
        if selected.is_empty() {
            return None;
        }

        let mut dis = Disambiguate {
            fact_size,
            mgroup_facts: vec![FixedBitSet::with_capacity(fact_size); selected.len()],
            fact_mgroups: vec![FixedBitSet::with_capacity(selected.len()); fact_size],
            fact_allowed: vec![FixedBitSet::with_capacity(fact_size); fact_size],
        };

        for (mi, facts) in selected.iter().enumerate() {
            for &f in facts.iter() {
                dis.mgroup_facts[mi].insert(f);
                dis.fact_mgroups[f].insert(mi);
            }
        }

        // mutexes implied by every group (not only the selected ones)
        for m in mgroups.iter() {
            let facts: Vec<FactId> = m.facts.iter().copied().collect();
            for (i, &f1) in facts.iter().enumerate() {
                for &f2 in facts.iter().skip(i + 1) {
                    dis.fact_allowed[f1].insert(f2);
                    dis.fact_allowed[f2].insert(f1);
                }
            }
        }
        for (f1, f2) in mutex.iter_pairs() {
            dis.fact_allowed[f1].insert(f2);
            dis.fact_allowed[f2].insert(f1);
        }

        // flip into "does not belong" / "is allowed with"
        for f in 0..fact_size {
            dis.fact_mgroups[f].toggle_range(..);
            dis.fact_allowed[f].toggle_range(..);
        }
        Some(dis)
    }

    pub fn add_mutex(&mut self, f1: FactId, f2: FactId) {
        self.fact_allowed[f1].set(f2, false);
        self.fact_allowed[f2].set(f1, false);
    }

    /// Extends `set` with forced facts; see [`DisambiguateResult`].
    pub fn set(&self, set: &mut BTreeSet<FactId>) -> DisambiguateResult {
        if set.is_empty() {
            return DisambiguateResult::Unchanged;
        }

        let mut candidates = FixedBitSet::with_capacity(self.mgroup_facts.len());
        let mut allowed = FixedBitSet::with_capacity(self.fact_size);
        candidates.toggle_range(..);
        allowed.toggle_range(..);
        for &f in set.iter() {
            candidates.intersect_with(&self.fact_mgroups[f]);
            allowed.intersect_with(&self.fact_allowed[f]);
        }

        let mut change = DisambiguateResult::Unchanged;
        loop {
            let mut local_change = false;
            let current: Vec<usize> = candidates.ones().collect();
            for mi in current {
                let mut options = self.mgroup_facts[mi].clone();
                options.intersect_with(&allowed);
                let count = options.count_ones(..);
                if count == 0 {
                    return DisambiguateResult::Mutex;
                }
                if count != 1 {
                    continue;
                }
                let forced = options.ones().next().unwrap();
                set.insert(forced);
                change = DisambiguateResult::Extended;
                local_change = true;
                allowed.intersect_with(&self.fact_allowed[forced]);
                candidates.intersect_with(&self.fact_mgroups[forced]);
            }
            if !local_change {
                break;
            }
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Facts 0 and 1 form an exactly-one group; facts 2..4 are free.
    fn fixture() -> (MutexPairs, MGroups) {
        let mutex = MutexPairs::new(5);
        let mut mgroups = MGroups::default();
        let g = mgroups.add([0, 1].into_iter().collect());
        g.is_exactly_one = true;
        (mutex, mgroups)
    }

    #[test]
    fn covered_set_is_unchanged() {
        let (mutex, mgroups) = fixture();
        let dis = Disambiguate::new(5, &mutex, &mgroups).unwrap();
        let mut set: BTreeSet<FactId> = [0].into_iter().collect();
        assert_eq!(dis.set(&mut set), DisambiguateResult::Unchanged);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn forced_member_extends_the_set() {
        let (mut mutex, mgroups) = fixture();
        // fact 2 rules out member 1, forcing member 0
        mutex.add(2, 1);
        let dis = Disambiguate::new(5, &mutex, &mgroups).unwrap();
        let mut set: BTreeSet<FactId> = [2].into_iter().collect();
        assert_eq!(dis.set(&mut set), DisambiguateResult::Extended);
        assert!(set.contains(&0));
    }

    #[test]
    fn empty_intersection_is_mutex() {
        let (mut mutex, mgroups) = fixture();
        // fact 2 is mutex with both members, so no state can contain it
        mutex.add(2, 0);
        mutex.add(2, 1);
        let dis = Disambiguate::new(5, &mutex, &mgroups).unwrap();
        let mut set: BTreeSet<FactId> = [2].into_iter().collect();
        assert_eq!(dis.set(&mut set), DisambiguateResult::Mutex);
    }
}
