//! Handler registry.
//!
//! Maps consumer-group ids to registered handlers. The registry is built
//! once at startup and injected wherever handler resolution is needed (the
//! replay path), never read from ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::handler::Handler;

/// Registry of handlers keyed by consumer-group id.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a consumer group, replacing any previous one.
    pub fn register(&mut self, group_id: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(group_id.into(), handler);
    }

    /// Resolve the handler for a consumer group.
    pub fn lookup(&self, group_id: &str) -> Result<Arc<dyn Handler>, RegistryError> {
        self.handlers
            .get(group_id)
            .cloned()
            .ok_or_else(|| RegistryError::HandlerNotFound {
                group_id: group_id.to_string(),
            })
    }
}
