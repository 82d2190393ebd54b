use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzers::{AccessibilityAgent, BudgetAgent, PerformanceAgent, TechStackAgent};
use crate::runner::ScanAgent;

/// Maps agent names (as they appear in scan plans) to implementations.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: HashMap<&'static str, Arc<dyn ScanAgent>>,
}

impl AgentRegistry {
    pub fn empty() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Registry with every built-in analyzer.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TechStackAgent));
        registry.register(Arc::new(PerformanceAgent));
        registry.register(Arc::new(AccessibilityAgent));
        registry.register(Arc::new(BudgetAgent));
        registry
    }

    pub fn register(&mut self, agent: Arc<dyn ScanAgent>) {
        self.agents.insert(agent.name(), agent);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScanAgent>> {
        self.agents.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.agents.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
