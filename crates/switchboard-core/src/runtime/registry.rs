//! Agent registry for runtime lookup by agent id.

use std::collections::BTreeMap;

use super::box_runtime::BoxAgentRuntime;

/// A registered agent: its runtime plus a human-readable description.
#[derive(Debug, Clone)]
pub struct RegisteredAgent {
    pub id: String,
    pub description: String,
    pub runtime: BoxAgentRuntime,
}

/// Registry of runnable agents, indexed by agent id.
///
/// Built once at startup from configuration. Handoff targets must be
/// registered here.
#[derive(Debug, Default, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, RegisteredAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. An agent with the same id is replaced.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        runtime: BoxAgentRuntime,
    ) {
        let id = id.into();
        self.agents.insert(
            id.clone(),
            RegisteredAgent {
                id,
                description: description.into(),
                runtime,
            },
        );
    }

    /// Builder-style `register`.
    pub fn with(
        mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        runtime: BoxAgentRuntime,
    ) -> Self {
        self.register(id, description, runtime);
        self
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredAgent> {
        self.agents.get(id)
    }

    pub fn runtime(&self, id: &str) -> Option<BoxAgentRuntime> {
        self.agents.get(id).map(|a| a.runtime.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Registered agents ordered by id.
    pub fn list(&self) -> impl Iterator<Item = &RegisteredAgent> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptedRuntime;

    #[test]
    fn test_register_and_lookup() {
        let registry = AgentRegistry::new()
            .with("it-support", "helpdesk", BoxAgentRuntime::new(ScriptedRuntime::new("a", vec![])))
            .with("sql-agent", "", BoxAgentRuntime::new(ScriptedRuntime::new("b", vec![])));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("sql-agent"));
        assert!(!registry.contains("router"));
        assert_eq!(registry.get("it-support").unwrap().description, "helpdesk");
        let ids: Vec<&str> = registry.list().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["it-support", "sql-agent"]);
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = AgentRegistry::new();
        registry.register("a", "first", BoxAgentRuntime::new(ScriptedRuntime::new("x", vec![])));
        registry.register("a", "second", BoxAgentRuntime::new(ScriptedRuntime::new("y", vec![])));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.runtime("a").unwrap().name(), "y");
    }
}
