//! A minimal decomposition model: a unified task id space where the first
//! ids are the ground operators (primitive tasks) and the rest are
//! abstract tasks refined by methods. Enough structure to express task and
//! method landmarks and the local-landmark walk.

use fixedbitset::FixedBitSet;

pub type TaskId = usize;
pub type MethodId = usize;

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    /// The abstract task this method decomposes.
    pub task: TaskId,
    pub subtasks: Vec<TaskId>,
}

#[derive(Debug, Clone)]
pub struct Decomposition {
    num_primitive: usize,
    abstract_names: Vec<String>,
    methods: Vec<Method>,
    task_to_methods: Vec<Vec<MethodId>>,
    initial_network: Vec<TaskId>,
}

impl Decomposition {
    pub fn new(num_primitive: usize) -> Self {
        Self {
            num_primitive,
            abstract_names: Vec::new(),
            methods: Vec::new(),
            task_to_methods: Vec::new(),
            initial_network: Vec::new(),
        }
    }

    pub fn num_primitive(&self) -> usize {
        self.num_primitive
    }

    pub fn num_tasks(&self) -> usize {
        self.num_primitive + self.abstract_names.len()
    }

    pub fn is_primitive(&self, task: TaskId) -> bool {
        task < self.num_primitive
    }

    pub fn abstract_name(&self, task: TaskId) -> &str {
        &self.abstract_names[task - self.num_primitive]
    }

    pub fn add_abstract(&mut self, name: impl Into<String>) -> TaskId {
        self.abstract_names.push(name.into());
        self.task_to_methods.push(Vec::new());
        self.num_primitive + self.abstract_names.len() - 1
    }

    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        task: TaskId,
        subtasks: Vec<TaskId>,
    ) -> MethodId {
        debug_assert!(!self.is_primitive(task));
        let id = self.methods.len();
        self.methods.push(Method {
            name: name.into(),
            task,
            subtasks,
        });
        self.task_to_methods[task - self.num_primitive].push(id);
        id
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id]
    }

    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn methods_of(&self, task: TaskId) -> &[MethodId] {
        if self.is_primitive(task) {
            &[]
        } else {
            &self.task_to_methods[task - self.num_primitive]
        }
    }

    pub fn set_initial_network(&mut self, network: Vec<TaskId>) {
        self.initial_network = network;
    }

    pub fn initial_network(&self) -> &[TaskId] {
        &self.initial_network
    }

    /// All tasks reachable from the given network by decomposition.
    pub fn reachable_from(&self, network: &[TaskId]) -> FixedBitSet {
        let mut reachable = FixedBitSet::with_capacity(self.num_tasks());
        let mut stack: Vec<TaskId> = network.to_vec();
        while let Some(task) = stack.pop() {
            if reachable.contains(task) {
                continue;
            }
            reachable.insert(task);
            for &m in self.methods_of(task) {
                for &sub in &self.methods[m].subtasks {
                    if !reachable.contains(sub) {
                        stack.push(sub);
                    }
                }
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reachability_follows_methods() {
        let mut d = Decomposition::new(2);
        let deliver = d.add_abstract("deliver");
        let fetch = d.add_abstract("fetch");
        d.add_method("m-deliver", deliver, vec![fetch, 1]);
        d.add_method("m-fetch", fetch, vec![0]);
        d.set_initial_network(vec![deliver]);

        let reachable = d.reachable_from(d.initial_network());
        assert!(reachable.contains(deliver));
        assert!(reachable.contains(fetch));
        assert!(reachable.contains(0));
        assert!(reachable.contains(1));

        let reachable = d.reachable_from(&[fetch]);
        assert!(reachable.contains(0));
        assert!(!reachable.contains(1));
        assert!(!reachable.contains(deliver));
    }
}
