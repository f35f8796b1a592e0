use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct SearchStatistics {
    expanded_nodes: usize,
    generated_nodes: usize,
    evaluated_nodes: usize,
    reopened_nodes: usize,
    dead_end_nodes: usize,
}

impl SearchStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_expanded_nodes(&mut self) {
        self.expanded_nodes += 1;
    }

    pub fn increment_generated_nodes(&mut self, n: usize) {
        self.generated_nodes += n;
    }

    pub fn increment_evaluated_nodes(&mut self) {
        self.evaluated_nodes += 1;
    }

    pub fn increment_reopened_nodes(&mut self) {
        self.reopened_nodes += 1;
    }

    pub fn increment_dead_end_nodes(&mut self) {
        self.dead_end_nodes += 1;
    }

    pub fn expanded_nodes(&self) -> usize {
        self.expanded_nodes
    }

    pub fn generated_nodes(&self) -> usize {
        self.generated_nodes
    }

    pub fn evaluated_nodes(&self) -> usize {
        self.evaluated_nodes
    }

    pub fn reopened_nodes(&self) -> usize {
        self.reopened_nodes
    }

    pub fn dead_end_nodes(&self) -> usize {
        self.dead_end_nodes
    }

    pub fn log(&self) {
        info!(
            expanded = self.expanded_nodes,
            generated = self.generated_nodes,
            evaluated = self.evaluated_nodes,
            reopened = self.reopened_nodes,
            dead_ends = self.dead_end_nodes,
            "search statistics"
        );
    }
}
