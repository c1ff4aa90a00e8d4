//! # Interruption adapters
//!
//! Each queue backend tells a running job whether it should stop early, for
//! instance because the worker process is shutting down. Probes are registered
//! by queue adapter name and looked up once at the start of every attempt;
//! the driver consults the probe only between items.
//!
//! Built-in names: `inline`, `async` and `test` never interrupt.
//! [`ShutdownFlag`] covers workers that stop through a shared flag.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub mod adapters;

pub use adapters::{NeverInterrupt, ShutdownFlag};

/// Answers whether the current attempt should stop after the item in progress.
pub trait InterruptionProbe: Send + Sync {
    fn should_interrupt(&self) -> bool;
}

impl<F> InterruptionProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_interrupt(&self) -> bool {
        self()
    }
}

pub type SharedProbe = Arc<dyn InterruptionProbe>;

pub struct InterruptionRegistry {
    probes: RwLock<HashMap<String, SharedProbe>>,
}

impl fmt::Debug for InterruptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.probes.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("InterruptionRegistry")
            .field("adapters", &names)
            .finish()
    }
}

impl Default for InterruptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptionRegistry {
    /// A registry holding the built-in adapters.
    pub fn new() -> Self {
        let registry = Self::empty();
        for name in ["inline", "async", "test"] {
            registry.register(name, NeverInterrupt);
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            probes: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace the probe for `name`.
    pub fn register<P: InterruptionProbe + 'static>(&self, name: &str, probe: P) {
        self.probes
            .write()
            .insert(name.to_string(), Arc::new(probe));
    }

    pub fn register_shared(&self, name: &str, probe: SharedProbe) {
        self.probes.write().insert(name.to_string(), probe);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.probes.read().contains_key(name)
    }

    /// Probe for `name`. Unknown names never interrupt; that fallback is
    /// deprecated and logged so unregistered backends get noticed.
    pub fn resolve(&self, name: &str) -> SharedProbe {
        if let Some(probe) = self.probes.read().get(name) {
            return probe.clone();
        }
        warn!(
            queue_adapter = name,
            "DEPRECATION: no interruption adapter registered for this queue adapter; \
             jobs will never be interrupted. Register one with InterruptionRegistry::register"
        );
        Arc::new(NeverInterrupt)
    }
}
