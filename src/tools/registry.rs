//! Tool lookup by name.

use std::collections::HashMap;
use std::sync::Arc;

use super::tool::Tool;
use super::types::ToolSpec;

/// Resolves tool names requested by the model into invokable tools.
///
/// Discovery and transport (remote tool servers and the like) live behind
/// this trait; the loop only needs lookup and the specs to advertise.
pub trait ToolRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>>;

    /// Specs advertised to the model, in a stable order.
    fn specs(&self) -> Vec<ToolSpec>;
}

/// Registry backed by a fixed set of tools.
#[derive(Default, Clone)]
pub struct StaticToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl StaticToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool; a later registration with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
            .collect()
    }
}

impl std::fmt::Debug for StaticToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AgentTool, AgentToolParameters};

    fn named(name: &str) -> Arc<dyn Tool> {
        Arc::new(AgentTool::new(
            name,
            "test tool",
            AgentToolParameters::empty(),
            |_args, _ctx| async { Ok(serde_json::Value::Null) },
        ))
    }

    #[test]
    fn registration_order_is_kept_and_duplicates_replace() {
        let mut registry = StaticToolRegistry::new(vec![named("b"), named("a")]);
        registry.register(named("b"));

        let names: Vec<_> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(registry.resolve("a").is_some());
        assert!(registry.resolve("missing").is_none());
    }
}
