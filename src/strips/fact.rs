//! The propositional fact table.

use crate::ground::{ArgTuple, GroundAtom};
use crate::pddl::{Pddl, PredId};
use std::collections::BTreeSet;

pub type FactId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub id: FactId,
    /// Canonical printable name, `(<predicate> <obj> ...)`.
    pub name: String,
    /// The ground atom this fact was created from, if any.
    pub ground_atom: Option<(PredId, ArgTuple)>,
    /// Pairs a fact with its negation twin.
    pub neg_of: Option<FactId>,
}

#[derive(Debug, Clone, Default)]
pub struct Facts {
    facts: Vec<Fact>,
}

impl Facts {
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn get(&self, id: FactId) -> &Fact {
        &self.facts[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    pub fn add_ground_atom(&mut self, ga: &GroundAtom, pddl: &Pddl) -> FactId {
        let mut name = format!("({}", pddl.preds.get(ga.pred).name);
        for &obj in ga.args.iter() {
            name.push(' ');
            name.push_str(pddl.objects.get(obj).name.as_str());
        }
        name.push(')');

        let id = self.facts.len();
        self.facts.push(Fact {
            id,
            name,
            ground_atom: Some((ga.pred, ga.args)),
            neg_of: None,
        });
        id
    }

    pub fn add_artificial(&mut self, name: impl Into<String>) -> FactId {
        let id = self.facts.len();
        self.facts.push(Fact {
            id,
            name: name.into(),
            ground_atom: None,
            neg_of: None,
        });
        id
    }

    /// Pairs negation twins using the predicate cross-links.
    pub fn link_neg_twins(&mut self, pddl: &Pddl) {
        let mut by_key: std::collections::HashMap<(PredId, ArgTuple), FactId> =
            std::collections::HashMap::new();
        for fact in &self.facts {
            if let Some(key) = fact.ground_atom {
                by_key.insert(key, fact.id);
            }
        }
        for id in 0..self.facts.len() {
            let Some((pred, args)) = self.facts[id].ground_atom else {
                continue;
            };
            if let Some(twin_pred) = pddl.preds.get(pred).neg_of {
                if let Some(&twin) = by_key.get(&(twin_pred, args)) {
                    self.facts[id].neg_of = Some(twin);
                }
            }
        }
    }

    /// Sorts facts by name and renumbers them; `remap[old] = new`.
    pub fn sort_by_name(&mut self) -> Vec<FactId> {
        let mut order: Vec<FactId> = (0..self.facts.len()).collect();
        order.sort_by(|&a, &b| {
            self.facts[a]
                .name
                .cmp(&self.facts[b].name)
                .then(a.cmp(&b))
        });
        let mut remap = vec![0; self.facts.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }
        self.apply_permutation(&remap);
        remap
    }

    fn apply_permutation(&mut self, remap: &[FactId]) {
        let mut sorted: Vec<Option<Fact>> = vec![None; self.facts.len()];
        for (old, fact) in self.facts.drain(..).enumerate() {
            let mut fact = fact;
            fact.id = remap[old];
            fact.neg_of = fact.neg_of.map(|t| remap[t]);
            sorted[remap[old]] = Some(fact);
        }
        self.facts = sorted.into_iter().map(|f| f.unwrap()).collect();
    }

    /// Removes the given facts and renumbers the survivors densely.
    /// Returns `remap` with `remap[old] = Some(new)` for survivors.
    pub fn remove_facts(&mut self, rm: &BTreeSet<FactId>) -> Vec<Option<FactId>> {
        let mut remap: Vec<Option<FactId>> = Vec::with_capacity(self.facts.len());
        let mut next = 0;
        for id in 0..self.facts.len() {
            if rm.contains(&id) {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }
        let mut survivors = Vec::with_capacity(next);
        for (old, fact) in self.facts.drain(..).enumerate() {
            let Some(new) = remap[old] else { continue };
            let mut fact = fact;
            fact.id = new;
            fact.neg_of = fact.neg_of.and_then(|t| remap[t]);
            survivors.push(fact);
        }
        self.facts = survivors;
        remap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Facts {
        let mut facts = Facts::default();
        for name in ["(c)", "(a)", "(b)"] {
            facts.add_artificial(name);
        }
        facts
    }

    #[test]
    fn sort_by_name_renumbers_densely() {
        let mut facts = fixture();
        let remap = facts.sort_by_name();
        assert_eq!(remap, vec![2, 0, 1]);
        assert_eq!(facts.get(0).name, "(a)");
        assert_eq!(facts.get(2).name, "(c)");
        assert!(facts.iter().enumerate().all(|(i, f)| f.id == i));
    }

    #[test]
    fn remove_facts_is_a_pure_renaming() {
        let mut facts = fixture();
        let rm: BTreeSet<FactId> = [1].into_iter().collect();
        let remap = facts.remove_facts(&rm);
        assert_eq!(remap, vec![Some(0), None, Some(1)]);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts.get(0).name, "(c)");
        assert_eq!(facts.get(1).name, "(b)");
        assert!(facts.iter().enumerate().all(|(i, f)| f.id == i));
    }
}
