use std::sync::Arc;

use crate::config::AgentConfig;
use crate::health::HealthState;
use crate::model::{Node, Role};

/// Immutable per-call context.
///
/// Leadership can change between events, so the dispatch layer builds a fresh
/// context for every event instead of the coordinators reading shared state.
#[derive(Clone)]
pub struct NodeContext {
    pub node: Node,
    pub config: Arc<AgentConfig>,
    /// Optional metrics sink
    pub health_state: Option<Arc<HealthState>>,
}

impl NodeContext {
    pub fn new(node: Node, config: Arc<AgentConfig>) -> Self {
        Self {
            node,
            config,
            health_state: None,
        }
    }

    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    pub fn role(&self) -> Role {
        self.node.role
    }

    pub fn is_leader(&self) -> bool {
        self.node.is_leader
    }

    pub fn address(&self) -> &str {
        &self.node.address
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node", &self.node)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
