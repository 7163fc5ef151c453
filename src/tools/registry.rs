//! Name-to-tool lookup and enumeration.

use std::sync::Arc;

use super::schema::ToolDeclaration;
use super::tool::Tool;

/// Catalogue of tools available to the model.
///
/// Registration is idempotent by name: registering a tool whose name is
/// already present replaces the earlier entry in place.
pub struct ToolRegistry<H> {
    tools: Vec<Arc<dyn Tool<H>>>,
}

impl<H> Default for ToolRegistry<H> {
    fn default() -> Self {
        Self { tools: Vec::new() }
    }
}

impl<H> ToolRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; the last registration for a name wins.
    pub fn register(&mut self, tool: Arc<dyn Tool<H>>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => {
                tracing::debug!(tool = tool.name(), "replacing registered tool");
                self.tools[idx] = tool;
            }
            None => self.tools.push(tool),
        }
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: impl Tool<H> + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool<H>>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Declarations in registration order.
    pub fn list(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|t| t.declaration()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<H> std::fmt::Debug for ToolRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
