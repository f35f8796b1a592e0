//! The symmetric pair-mutex table over facts. `mutex(f, f)` marks `f`
//! unreachable, which makes the whole row mutex.

use crate::strips::FactId;
use fixedbitset::FixedBitSet;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct MutexPairs {
    fact_size: usize,
    map: FixedBitSet,
    num_pairs: usize,
}

impl MutexPairs {
    pub fn new(fact_size: usize) -> Self {
        Self {
            fact_size,
            map: FixedBitSet::with_capacity(fact_size * fact_size),
            num_pairs: 0,
        }
    }

    pub fn fact_size(&self) -> usize {
        self.fact_size
    }

    /// Number of distinct off-diagonal pairs.
    pub fn num_pairs(&self) -> usize {
        self.num_pairs
    }

    #[inline]
    fn idx(&self, f1: FactId, f2: FactId) -> usize {
        f1 * self.fact_size + f2
    }

    /// Inserts a mutex; the diagonal marks the whole row. Idempotent.
    pub fn add(&mut self, f1: FactId, f2: FactId) {
        debug_assert!(f1 < self.fact_size && f2 < self.fact_size);
        if f1 == f2 {
            for i in 0..self.fact_size {
                if i != f1 && !self.map.contains(self.idx(f1, i)) {
                    self.num_pairs += 1;
                }
                self.map.insert(self.idx(f1, i));
                self.map.insert(self.idx(i, f1));
            }
        } else {
            if !self.map.contains(self.idx(f1, f2)) {
                self.num_pairs += 1;
            }
            self.map.insert(self.idx(f1, f2));
            self.map.insert(self.idx(f2, f1));
        }
    }

    pub fn is_mutex(&self, f1: FactId, f2: FactId) -> bool {
        self.map.contains(self.idx(f1, f2))
    }

    /// Whether the set contains a mutex pair (including an unreachable
    /// member).
    pub fn is_mutex_set(&self, fs: &BTreeSet<FactId>) -> bool {
        let facts: Vec<FactId> = fs.iter().copied().collect();
        for (i, &f1) in facts.iter().enumerate() {
            for &f2 in facts.iter().skip(i) {
                if self.is_mutex(f1, f2) {
                    return true;
                }
            }
        }
        false
    }

    pub fn is_mutex_fact_set(&self, fact: FactId, fs: &BTreeSet<FactId>) -> bool {
        fs.iter().any(|&f| self.is_mutex(fact, f))
    }

    pub fn is_mutex_set_set(&self, fs1: &BTreeSet<FactId>, fs2: &BTreeSet<FactId>) -> bool {
        fs1.iter()
            .any(|&f1| fs2.iter().any(|&f2| self.is_mutex(f1, f2)))
    }

    /// Iterates all mutex pairs `(f1, f2)` with `f1 <= f2`.
    pub fn iter_pairs(&self) -> impl Iterator<Item = (FactId, FactId)> + '_ {
        (0..self.fact_size).flat_map(move |f1| {
            (f1..self.fact_size)
                .filter(move |&f2| self.is_mutex(f1, f2))
                .map(move |f2| (f1, f2))
        })
    }

    /// Rewrites the table after fact removal; `remap[old] = Some(new)`.
    pub fn reduce(&mut self, remap: &[Option<FactId>]) {
        let new_size = remap.iter().flatten().count();
        let mut reduced = MutexPairs::new(new_size);
        for f1 in 0..self.fact_size {
            let Some(n1) = remap[f1] else { continue };
            for f2 in f1..self.fact_size {
                let Some(n2) = remap[f2] else { continue };
                if self.is_mutex(f1, f2) {
                    reduced.add(n1, n2);
                }
            }
        }
        *self = reduced;
    }

    /// Marks every pair within a fact set as mutex.
    pub fn add_group(&mut self, facts: &BTreeSet<FactId>) {
        let facts: Vec<FactId> = facts.iter().copied().collect();
        for (i, &f1) in facts.iter().enumerate() {
            for &f2 in facts.iter().skip(i + 1) {
                self.add(f1, f2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_symmetric_and_counts_once() {
        let mut m = MutexPairs::new(4);
        m.add(0, 2);
        m.add(2, 0);
        assert!(m.is_mutex(0, 2) && m.is_mutex(2, 0));
        assert_eq!(m.num_pairs(), 1);
    }

    #[test]
    fn diagonal_marks_the_row() {
        let mut m = MutexPairs::new(3);
        m.add(1, 1);
        assert!(m.is_mutex(1, 0) && m.is_mutex(1, 1) && m.is_mutex(1, 2));
        assert!(m.is_mutex(0, 1) && m.is_mutex(2, 1));
        assert_eq!(m.num_pairs(), 2);
    }

    #[test]
    fn reduce_renumbers_pairs() {
        let mut m = MutexPairs::new(3);
        m.add(0, 2);
        let remap = vec![Some(0), None, Some(1)];
        m.reduce(&remap);
        assert_eq!(m.fact_size(), 2);
        assert!(m.is_mutex(0, 1));
        assert_eq!(m.num_pairs(), 1);
    }
}
