//! Named-instance registry.

use std::sync::Arc;

use dashmap::DashMap;
use smol_str::SmolStr;

use courier_core::Transport;

use crate::client::Courier;
use crate::config::CourierConfig;

/// Registry of named [`Courier`] instances.
///
/// `create` is idempotent per name: the first call binds the
/// configuration, later calls return the existing instance and ignore
/// their arguments.
#[derive(Default, Clone)]
pub struct CourierRegistry {
    instances: Arc<DashMap<SmolStr, Courier>>,
}

impl CourierRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance named `name`, creating it on first use.
    pub fn create(
        &self,
        name: impl Into<SmolStr>,
        transport: Arc<dyn Transport>,
        config: CourierConfig,
    ) -> Courier {
        self.instances
            .entry(name.into())
            .or_insert_with(|| Courier::new(transport, config))
            .clone()
    }

    /// Looks up an existing instance.
    pub fn get(&self, name: &str) -> Option<Courier> {
        self.instances.get(name).map(|entry| entry.clone())
    }

    /// Shuts down and forgets the instance named `name`.
    pub fn remove(&self, name: &str) -> bool {
        match self.instances.remove(name) {
            Some((_, courier)) => {
                courier.shutdown();
                true
            }
            None => false,
        }
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
