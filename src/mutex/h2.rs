//! h²-style fixed point over pairs of facts, producing pair mutexes,
//! unreachable facts and unreachable operators. The forward/backward
//! variant alternates with a reversed operator set carrying e-deletes, and
//! can be strengthened by disambiguation.

use crate::error::{Error, Result};
use crate::mutex::{Disambiguate, DisambiguateResult, MGroups, MutexPairs};
use crate::strips::{FactId, StripsOp, StripsTask};
use std::collections::BTreeSet;
use tracing::info;

const UNSET: i8 = 0;
const REACHED: i8 = 1;
const MUTEX: i8 = -1;
const PRUNED: i8 = -1;

/// Memory gate for the per-operator/fact matrix: the matrix is only
/// allocated when it fits the budget.
#[derive(Debug, Clone, Copy)]
pub struct H2Limits {
    pub max_op_fact_bytes: usize,
}

impl Default for H2Limits {
    fn default() -> Self {
        Self {
            max_op_fact_bytes: 1 << 30,
        }
    }
}

struct H2 {
    fact_size: usize,
    fact: Vec<i8>,
    op: Vec<i8>,
    op_fact: Option<Vec<i8>>,
    disambiguate: Option<Disambiguate>,
}

impl H2 {
    fn new(
        task: &StripsTask,
        mutex: &MutexPairs,
        unreachable_facts: Option<&BTreeSet<FactId>>,
        unreachable_ops: Option<&BTreeSet<usize>>,
    ) -> Self {
        let fact_size = task.facts.len();
        let mut h2 = Self {
            fact_size,
            fact: vec![UNSET; fact_size * fact_size],
            op: vec![UNSET; task.ops.len()],
            op_fact: None,
            disambiguate: None,
        };
        for (f1, f2) in mutex.iter_pairs() {
            h2.set_mutex(f1, f2);
        }
        if let Some(facts) = unreachable_facts {
            for &f in facts {
                h2.set_mutex(f, f);
            }
        }
        if let Some(ops) = unreachable_ops {
            for &op in ops {
                h2.op[op] = PRUNED;
            }
        }
        h2
    }

    #[inline]
    fn at(&self, f1: FactId, f2: FactId) -> i8 {
        self.fact[f1 * self.fact_size + f2]
    }

    #[inline]
    fn set(&mut self, f1: FactId, f2: FactId, v: i8) {
        self.fact[f1 * self.fact_size + f2] = v;
        self.fact[f2 * self.fact_size + f1] = v;
    }

    fn set_reached(&mut self, f1: FactId, f2: FactId) -> bool {
        if self.at(f1, f2) == UNSET {
            self.set(f1, f2, REACHED);
            return true;
        }
        false
    }

    fn set_mutex(&mut self, f1: FactId, f2: FactId) {
        self.set(f1, f2, MUTEX);
    }

    fn is_mutex(&self, f1: FactId, f2: FactId) -> bool {
        self.at(f1, f2) == MUTEX
    }

    fn alloc_op_fact(&mut self, task: &StripsTask, limits: &H2Limits) {
        let size = self.fact_size.checked_mul(task.ops.len());
        match size {
            Some(size) if size <= limits.max_op_fact_bytes => {
                self.op_fact = Some(vec![UNSET; size]);
                self.reset_op_fact(&task.ops);
                info!(
                    bytes = size,
                    "h2 uses the additional per-operator fact matrix"
                );
            }
            _ => self.op_fact = None,
        }
    }

    /// Marks each operator's own add/del facts as excluded in the matrix.
    fn reset_op_fact(&mut self, ops: &[StripsOp]) {
        let Some(op_fact) = self.op_fact.as_mut() else {
            return;
        };
        op_fact.fill(UNSET);
        for (op_id, op) in ops.iter().enumerate() {
            let row = &mut op_fact[op_id * self.fact_size..(op_id + 1) * self.fact_size];
            for &f in op.add_eff.iter().chain(op.del_eff.iter()) {
                row[f] = -1;
            }
        }
    }

    fn set_fw_init(&mut self, init: &BTreeSet<FactId>) {
        for &f1 in init {
            for &f2 in init {
                self.set_reached(f1, f2);
            }
        }
    }

    fn is_applicable(&self, op_id: usize, op: &StripsOp) -> bool {
        if self.op[op_id] == PRUNED {
            return false;
        }
        if self.op[op_id] == REACHED {
            return true;
        }
        for &f1 in &op.pre {
            for &f2 in &op.pre {
                if self.at(f1, f2) != REACHED {
                    return false;
                }
            }
        }
        true
    }

    fn is_applicable_with(&self, op_id: usize, op: &StripsOp, fact: FactId) -> bool {
        if self.op[op_id] != REACHED {
            return false;
        }
        if self.at(fact, fact) != REACHED {
            return false;
        }
        if self.op_fact.is_none() && (op.add_eff.contains(&fact) || op.del_eff.contains(&fact)) {
            return false;
        }
        op.pre.iter().all(|&p| self.at(p, fact) == REACHED)
    }

    fn apply_op(&mut self, op_id: usize, op: &StripsOp) -> bool {
        let mut updated = false;
        if !self.is_applicable(op_id, op) {
            return false;
        }

        if self.op[op_id] != REACHED {
            let adds: Vec<FactId> = op.add_eff.iter().copied().collect();
            for &a1 in &adds {
                for &a2 in &adds {
                    updated |= self.set_reached(a1, a2);
                }
            }
            self.op[op_id] = REACHED;
        }

        for fact in 0..self.fact_size {
            if let Some(op_fact) = &self.op_fact {
                if op_fact[op_id * self.fact_size + fact] != UNSET {
                    continue;
                }
            }
            if self.is_applicable_with(op_id, op, fact) {
                if let Some(op_fact) = self.op_fact.as_mut() {
                    op_fact[op_id * self.fact_size + fact] = 1;
                }
                let adds: Vec<FactId> = op.add_eff.iter().copied().collect();
                for a in adds {
                    updated |= self.set_reached(a, fact);
                }
            }
        }
        updated
    }

    /// One direction's fixed point; returns true if new mutexes or pruned
    /// operators appeared, and resets REACHED marks for the next round.
    fn run(&mut self, ops: &[StripsOp]) -> bool {
        loop {
            let mut updated = false;
            for (op_id, op) in ops.iter().enumerate() {
                updated |= self.apply_op(op_id, op);
            }
            if !updated {
                break;
            }
        }

        let mut changed = false;
        for f1 in 0..self.fact_size {
            for f2 in f1..self.fact_size {
                match self.at(f1, f2) {
                    UNSET => {
                        self.set_mutex(f1, f2);
                        if let Some(dis) = self.disambiguate.as_mut() {
                            dis.add_mutex(f1, f2);
                        }
                        changed = true;
                    }
                    REACHED => self.set(f1, f2, UNSET),
                    _ => {}
                }
            }
        }
        for op_id in 0..self.op.len() {
            match self.op[op_id] {
                UNSET => {
                    self.op[op_id] = PRUNED;
                    changed = true;
                }
                REACHED => self.op[op_id] = UNSET,
                _ => {}
            }
        }
        changed
    }

    fn write_output(
        &self,
        mutex: &mut MutexPairs,
        unreachable_facts: Option<&mut BTreeSet<FactId>>,
        unreachable_ops: Option<&mut BTreeSet<usize>>,
    ) {
        let mut unreachable_facts = unreachable_facts;
        for f1 in 0..self.fact_size {
            for f2 in f1..self.fact_size {
                if self.is_mutex(f1, f2) {
                    mutex.add(f1, f2);
                    if f1 == f2 {
                        if let Some(facts) = unreachable_facts.as_deref_mut() {
                            facts.insert(f1);
                        }
                    }
                }
            }
        }
        if let Some(ops) = unreachable_ops {
            for (op_id, &v) in self.op.iter().enumerate() {
                if v == PRUNED {
                    ops.insert(op_id);
                }
            }
        }
    }
}

/// The forward h² fixed point.
pub fn h2(
    task: &StripsTask,
    mutex: &mut MutexPairs,
    mut unreachable_facts: Option<&mut BTreeSet<FactId>>,
    mut unreachable_ops: Option<&mut BTreeSet<usize>>,
    limits: &H2Limits,
) -> Result<()> {
    if task.has_cond_eff {
        return Err(Error::semantic(
            "h2: conditional effects are not supported",
        ));
    }
    info!(
        facts = task.facts.len(),
        ops = task.ops.len(),
        mutex_pairs = mutex.num_pairs(),
        "h2 started"
    );

    let mut h2 = H2::new(
        task,
        mutex,
        unreachable_facts.as_deref(),
        unreachable_ops.as_deref(),
    );
    h2.alloc_op_fact(task, limits);
    h2.set_fw_init(&task.init);
    h2.run(&task.ops);
    h2.write_output(mutex, unreachable_facts.as_deref_mut(), unreachable_ops.as_deref_mut());

    info!(mutex_pairs = mutex.num_pairs(), "h2 done");
    Ok(())
}

/* ----- forward/backward variant ----- */

fn set_bw_init(h2: &mut H2, goal: &BTreeSet<FactId>) {
    let mut goal: BTreeSet<FactId> = goal.clone();
    if let Some(dis) = &h2.disambiguate {
        let _ = dis.set(&mut goal);
    }

    for f in 0..h2.fact_size {
        if h2.is_mutex(f, f) || goal.iter().any(|&g| h2.is_mutex(f, g)) {
            continue;
        }
        h2.set_reached(f, f);
    }
    for f1 in 0..h2.fact_size {
        if h2.at(f1, f1) != REACHED {
            continue;
        }
        for f2 in f1 + 1..h2.fact_size {
            if h2.at(f2, f2) != REACHED || h2.is_mutex(f1, f2) {
                continue;
            }
            h2.set_reached(f1, f2);
        }
    }
}

/// The reversed operator: prevails plus adds as precondition, deletes as
/// adds, and every fact mutex with a precondition as an e-delete.
fn op_init_bw(bw_op: &mut StripsOp, fw_op: &StripsOp, h2: &H2) {
    bw_op.pre = &fw_op.pre - &fw_op.del_eff;
    bw_op.pre.extend(fw_op.add_eff.iter().copied());
    bw_op.add_eff = fw_op.del_eff.clone();
    bw_op.del_eff.clear();
    op_set_e_deletes(bw_op, fw_op, h2);
}

fn op_set_e_deletes(bw_op: &mut StripsOp, fw_op: &StripsOp, h2: &H2) {
    for &pre_fact in &fw_op.pre {
        for fact in 0..h2.fact_size {
            if h2.is_mutex(pre_fact, fact) {
                bw_op.del_eff.insert(fact);
            }
        }
    }
    bw_op.del_eff = &bw_op.del_eff - &bw_op.add_eff;
    bw_op.pre.extend(bw_op.del_eff.iter().copied());
}

fn ops_update_bw(bw_ops: &mut [StripsOp], fw_ops: &[StripsOp], h2: &mut H2) -> bool {
    let mut changed = false;
    for op_id in 0..bw_ops.len() {
        if h2.op[op_id] == PRUNED {
            continue;
        }
        if let Some(dis) = &h2.disambiguate {
            if dis.set(&mut bw_ops[op_id].pre) == DisambiguateResult::Mutex {
                h2.op[op_id] = PRUNED;
                changed = true;
                continue;
            }
        }
        op_set_e_deletes(&mut bw_ops[op_id], &fw_ops[op_id], h2);
    }
    changed
}

fn ops_update_fw(fw_ops: &mut [StripsOp], h2: &mut H2) -> bool {
    let mut changed = false;
    if h2.disambiguate.is_none() {
        return false;
    }
    for op_id in 0..fw_ops.len() {
        if h2.op[op_id] == PRUNED {
            continue;
        }
        let dis = h2.disambiguate.as_ref().unwrap();
        if dis.set(&mut fw_ops[op_id].pre) == DisambiguateResult::Mutex {
            h2.op[op_id] = PRUNED;
            changed = true;
        }
    }
    changed
}

/// Alternating forward and backward h² fixed points until neither
/// direction learns anything new.
pub fn h2_fw_bw(
    task: &StripsTask,
    mgroups: &MGroups,
    mutex: &mut MutexPairs,
    mut unreachable_facts: Option<&mut BTreeSet<FactId>>,
    mut unreachable_ops: Option<&mut BTreeSet<usize>>,
    limits: &H2Limits,
) -> Result<()> {
    if task.has_cond_eff {
        return Err(Error::semantic(
            "h2 fw/bw: conditional effects are not supported",
        ));
    }
    info!(
        facts = task.facts.len(),
        ops = task.ops.len(),
        mutex_pairs = mutex.num_pairs(),
        "h2 fw/bw started"
    );

    let mut h2 = H2::new(
        task,
        mutex,
        unreachable_facts.as_deref(),
        unreachable_ops.as_deref(),
    );
    h2.disambiguate = Disambiguate::new(task.facts.len(), mutex, mgroups);

    let mut fw_ops: Vec<StripsOp> = task.ops.clone();
    let mut bw_ops: Vec<StripsOp> = task.ops.clone();
    for op_id in 0..bw_ops.len() {
        let mut bw = bw_ops[op_id].clone();
        op_init_bw(&mut bw, &fw_ops[op_id], &h2);
        bw_ops[op_id] = bw;
    }

    h2.alloc_op_fact(task, limits);

    let mut update_fw = true;
    let mut update_bw = true;
    while update_fw || update_bw {
        if update_fw {
            update_fw = false;
            h2.set_fw_init(&task.init);
            ops_update_fw(&mut fw_ops, &mut h2);
            h2.reset_op_fact(&fw_ops);
            update_bw |= h2.run(&fw_ops);
        }
        if update_bw {
            update_bw = false;
            set_bw_init(&mut h2, &task.goal);
            update_fw |= ops_update_fw(&mut fw_ops, &mut h2);
            update_fw |= ops_update_bw(&mut bw_ops, &fw_ops, &mut h2);
            h2.reset_op_fact(&bw_ops);
            update_fw |= h2.run(&bw_ops);
        }
    }

    h2.write_output(mutex, unreachable_facts.as_deref_mut(), unreachable_ops.as_deref_mut());
    info!(mutex_pairs = mutex.num_pairs(), "h2 fw/bw done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strips::{Facts, StripsTask};

    /// Three location facts, operators moving between them, starting at a.
    fn move_task() -> StripsTask {
        let mut facts = Facts::default();
        for name in ["(at a)", "(at b)", "(at c)"] {
            facts.add_artificial(name);
        }
        let mut ops = Vec::new();
        for from in 0..3usize {
            for to in 0..3usize {
                if from == to {
                    continue;
                }
                let mut op = StripsOp::new(format!("move {} {}", from, to));
                op.pre.insert(from);
                op.add_eff.insert(to);
                op.del_eff.insert(from);
                op.normalize();
                ops.push(op);
            }
        }
        StripsTask {
            facts,
            ops,
            init: [0].into_iter().collect(),
            goal: [2].into_iter().collect(),
            ..StripsTask::default()
        }
    }

    #[test]
    fn location_facts_are_pairwise_mutex() {
        let task = move_task();
        let mut mutex = MutexPairs::new(task.facts.len());
        let mut unreachable = BTreeSet::new();
        h2(&task, &mut mutex, Some(&mut unreachable), None, &H2Limits::default()).unwrap();

        assert!(mutex.is_mutex(0, 1));
        assert!(mutex.is_mutex(0, 2));
        assert!(mutex.is_mutex(1, 2));
        assert!(unreachable.is_empty());
        // the table stays symmetric
        for f1 in 0..3 {
            for f2 in 0..3 {
                assert_eq!(mutex.is_mutex(f1, f2), mutex.is_mutex(f2, f1));
            }
        }
    }

    #[test]
    fn unreachable_fact_is_self_mutex() {
        let mut task = move_task();
        // no operator ever adds this fact
        task.facts.add_artificial("(jetpack)");
        let mut mutex = MutexPairs::new(task.facts.len());
        let mut unreachable = BTreeSet::new();
        let mut unreachable_ops = BTreeSet::new();
        h2(
            &task,
            &mut mutex,
            Some(&mut unreachable),
            Some(&mut unreachable_ops),
            &H2Limits::default(),
        )
        .unwrap();

        assert!(mutex.is_mutex(3, 3));
        assert_eq!(unreachable, [3].into_iter().collect());
        assert!(unreachable_ops.is_empty());
    }

    #[test]
    fn op_with_unreachable_precondition_is_pruned() {
        let mut task = move_task();
        let jetpack = task.facts.add_artificial("(jetpack)");
        let mut op = StripsOp::new("fly".into());
        op.pre.insert(jetpack);
        op.add_eff.insert(2);
        op.normalize();
        task.ops.push(op);

        let mut mutex = MutexPairs::new(task.facts.len());
        let mut unreachable_ops = BTreeSet::new();
        h2(&task, &mut mutex, None, Some(&mut unreachable_ops), &H2Limits::default()).unwrap();
        assert_eq!(unreachable_ops, [6].into_iter().collect());
    }

    #[test]
    fn fw_bw_variant_agrees_on_the_move_task() {
        let task = move_task();
        let mut mgroups = MGroups::default();
        let g = mgroups.add([0, 1, 2].into_iter().collect());
        g.is_exactly_one = true;
        let mut mutex = MutexPairs::new(task.facts.len());
        h2_fw_bw(&task, &mgroups, &mut mutex, None, None, &H2Limits::default()).unwrap();
        assert!(mutex.is_mutex(0, 1) && mutex.is_mutex(0, 2) && mutex.is_mutex(1, 2));
    }

    #[test]
    fn rejects_conditional_effects() {
        let mut task = move_task();
        task.has_cond_eff = true;
        let mut mutex = MutexPairs::new(task.facts.len());
        assert!(h2(&task, &mut mutex, None, None, &H2Limits::default()).is_err());
    }
}
