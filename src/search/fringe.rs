//! The LAMA-style alternating fringe: up to three priority queues
//! (FF-normal, FF-preferred, landmark-count) sharing reference-counted
//! node wrappers, with a boost counter that favours the preferred queue
//! whenever the FF estimate improves.

use crate::search::{NodeId, SearchNode};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GVariant {
    /// Pure greedy: the key is the weighted heuristic alone.
    #[default]
    None,
    PathCost,
    ActionCost,
    /// Path length plus action costs.
    Mixed,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub g: GVariant,
    pub weight: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            g: GVariant::None,
            weight: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LamaConfig {
    pub use_ff: bool,
    pub use_ff_preferred: bool,
    pub use_lm: bool,
    pub ff: QueueConfig,
    pub lm: QueueConfig,
    pub boost: i64,
}

impl Default for LamaConfig {
    fn default() -> Self {
        Self {
            use_ff: true,
            use_ff_preferred: true,
            use_lm: true,
            ff: QueueConfig::default(),
            lm: QueueConfig::default(),
            boost: 1000,
        }
    }
}

impl GVariant {
    fn g(&self, node: &SearchNode) -> i64 {
        match self {
            GVariant::None => 0,
            GVariant::PathCost => node.path_length,
            GVariant::ActionCost => node.action_costs,
            GVariant::Mixed => node.path_length + node.action_costs,
        }
    }
}

#[derive(Debug, Clone)]
struct Wrapper {
    node: NodeId,
    /// Monotonically increasing; ties on the key break toward the oldest
    /// wrapper.
    id: u64,
    key_ff: i64,
    key_lm: i64,
    contained: u8,
    popped: bool,
}

type Queue = PriorityQueue<usize, Reverse<(i64, u64)>>;

#[derive(Debug)]
pub struct LamaFringe {
    cfg: LamaConfig,
    wrappers: Vec<Wrapper>,
    free: Vec<usize>,
    ff_normal: Queue,
    ff_preferred: Queue,
    lm: Queue,
    prio_ff: i64,
    prio_ff_preferred: i64,
    prio_lm: i64,
    next_id: u64,
    best_ff: i64,
    num_pushes: usize,
    num_pops: usize,
}

impl LamaFringe {
    pub fn new(cfg: LamaConfig) -> Self {
        assert!(
            cfg.use_ff || cfg.use_lm,
            "the fringe needs at least one queue"
        );
        assert!(
            !cfg.use_ff_preferred || cfg.use_ff,
            "the preferred queue requires the FF queue"
        );
        Self {
            cfg,
            wrappers: Vec::new(),
            free: Vec::new(),
            ff_normal: Queue::new(),
            ff_preferred: Queue::new(),
            lm: Queue::new(),
            prio_ff: 0,
            prio_ff_preferred: 0,
            prio_lm: 0,
            next_id: 0,
            best_ff: i64::MAX,
            num_pushes: 0,
            num_pops: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ff_normal.is_empty() && self.ff_preferred.is_empty() && self.lm.is_empty()
    }

    pub fn num_pushes(&self) -> usize {
        self.num_pushes
    }

    pub fn num_pops(&self) -> usize {
        self.num_pops
    }

    /// Boost counter of the preferred queue; visible for accounting.
    pub fn preferred_boost(&self) -> i64 {
        self.prio_ff_preferred
    }

    pub fn push(&mut self, node: &SearchNode) {
        let wrapper_idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.wrappers.push(Wrapper {
                    node: 0,
                    id: 0,
                    key_ff: 0,
                    key_lm: 0,
                    contained: 0,
                    popped: false,
                });
                self.wrappers.len() - 1
            }
        };
        let id = self.next_id;
        self.next_id += 1;
        let key_ff = self.cfg.ff.g.g(node) + self.cfg.ff.weight * node.h_ff;
        let key_lm = self.cfg.lm.g.g(node) + self.cfg.lm.weight * node.h_lm;
        self.wrappers[wrapper_idx] = Wrapper {
            node: node.id,
            id,
            key_ff,
            key_lm,
            contained: 0,
            popped: false,
        };

        if self.cfg.use_lm {
            self.lm.push(wrapper_idx, Reverse((key_lm, id)));
            self.wrappers[wrapper_idx].contained += 1;
        }
        if self.cfg.use_ff {
            self.ff_normal.push(wrapper_idx, Reverse((key_ff, id)));
            self.wrappers[wrapper_idx].contained += 1;
            if self.cfg.use_ff_preferred {
                if node.h_ff < self.best_ff {
                    self.best_ff = node.h_ff;
                    self.prio_ff_preferred += self.cfg.boost;
                }
                if node.reached_by_helpful {
                    self.ff_preferred.push(wrapper_idx, Reverse((key_ff, id)));
                    self.wrappers[wrapper_idx].contained += 1;
                }
            }
        }
        self.num_pushes += 1;
    }

    /// The queue with the largest boost counter among the non-empty ones;
    /// the preferred queue wins ties, the FF queue beats the landmark
    /// queue.
    fn determine_fringe(&self) -> Option<FringeChoice> {
        let mut max = i64::MIN;
        let mut choice = None;
        if self.cfg.use_lm && !self.lm.is_empty() && self.prio_lm >= max {
            max = self.prio_lm;
            choice = Some(FringeChoice::Lm);
        }
        if self.cfg.use_ff && !self.ff_normal.is_empty() && self.prio_ff >= max {
            max = self.prio_ff;
            choice = Some(FringeChoice::Ff);
        }
        if self.cfg.use_ff_preferred
            && !self.ff_preferred.is_empty()
            && self.prio_ff_preferred >= max
        {
            choice = Some(FringeChoice::FfPreferred);
        }
        choice
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        let wrapper_idx = match self.determine_fringe()? {
            FringeChoice::Lm => {
                let (idx, _) = self.lm.pop()?;
                self.prio_lm -= 1;
                idx
            }
            FringeChoice::Ff => {
                let (idx, _) = self.ff_normal.pop()?;
                self.prio_ff -= 1;
                idx
            }
            FringeChoice::FfPreferred => {
                let (idx, _) = self.ff_preferred.pop()?;
                self.prio_ff_preferred -= 1;
                idx
            }
        };

        debug_assert!(!self.wrappers[wrapper_idx].popped, "wrapper popped twice");
        let node = self.wrappers[wrapper_idx].node;
        self.wrappers[wrapper_idx].popped = true;
        self.release(wrapper_idx);

        // discard already-popped wrappers from the other queues' tops
        self.cleanup();
        self.num_pops += 1;
        Some(node)
    }

    fn release(&mut self, wrapper_idx: usize) {
        self.wrappers[wrapper_idx].contained -= 1;
        if self.wrappers[wrapper_idx].contained == 0 {
            self.free.push(wrapper_idx);
        }
    }

    fn cleanup(&mut self) {
        for which in [FringeChoice::Ff, FringeChoice::FfPreferred, FringeChoice::Lm] {
            loop {
                let queue = match which {
                    FringeChoice::Ff => &mut self.ff_normal,
                    FringeChoice::FfPreferred => &mut self.ff_preferred,
                    FringeChoice::Lm => &mut self.lm,
                };
                let Some((&idx, _)) = queue.peek() else { break };
                if !self.wrappers[idx].popped {
                    break;
                }
                queue.pop();
                self.release(idx);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FringeChoice {
    Ff,
    FfPreferred,
    Lm,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn node(id: NodeId, h_ff: i64, h_lm: i64, helpful: bool) -> SearchNode {
        let mut n = SearchNode::root(id, BTreeSet::new());
        n.h_ff = h_ff;
        n.h_lm = h_lm;
        n.reached_by_helpful = helpful;
        n
    }

    #[test]
    fn a_node_is_popped_at_most_once() {
        let mut fringe = LamaFringe::new(LamaConfig::default());
        fringe.push(&node(0, 5, 5, true));
        fringe.push(&node(1, 3, 7, false));

        let mut popped = Vec::new();
        while let Some(n) = fringe.pop() {
            popped.push(n);
        }
        popped.sort_unstable();
        assert_eq!(popped, vec![0, 1]);
        assert!(fringe.num_pops() <= fringe.num_pushes());
    }

    #[test]
    fn new_best_ff_values_accumulate_boost() {
        let mut fringe = LamaFringe::new(LamaConfig::default());
        for i in 0..1000 {
            fringe.push(&node(i as NodeId, 1000 - i, 1, true));
        }
        assert_eq!(fringe.preferred_boost(), 1000 * 1000);
    }

    #[test]
    fn boosted_preferred_queue_is_drained_first() {
        let mut fringe = LamaFringe::new(LamaConfig::default());
        fringe.push(&node(0, 10, 10, true));
        fringe.push(&node(1, 5, 5, false));
        // node 0 triggered the boost; the preferred queue only holds it
        assert_eq!(fringe.pop(), Some(0));
    }

    #[test]
    fn ties_break_toward_the_oldest_wrapper() {
        let cfg = LamaConfig {
            use_ff_preferred: false,
            use_lm: false,
            ..LamaConfig::default()
        };
        let mut fringe = LamaFringe::new(cfg);
        fringe.push(&node(7, 4, 0, false));
        fringe.push(&node(8, 4, 0, false));
        assert_eq!(fringe.pop(), Some(7));
        assert_eq!(fringe.pop(), Some(8));
    }

    #[test]
    fn lm_queue_pops_when_its_boost_catches_up() {
        let mut fringe = LamaFringe::new(LamaConfig::default());
        // one push, new best -> preferred boost = 1000
        fringe.push(&node(0, 1, 1, true));
        // wrapper 0 sits in all three queues; preferred wins the first pop
        assert_eq!(fringe.pop(), Some(0));
        // the popped wrapper was cleaned out of the other queues
        assert!(fringe.is_empty());
    }
}
