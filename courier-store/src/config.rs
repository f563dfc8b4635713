use std::sync::Arc;

use serde::Deserialize;

use crate::{MemoryStore, r#trait::Store};

/// Runtime selection of the store backend.
///
/// # Examples
///
/// Memory-backed store in RON config:
/// ```ron
/// Courier (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum StoreConfig {
    /// In-memory tables. State does not survive a restart; suitable for
    /// development, tests, and transient deployments. A relational backend
    /// implements the same [`Store`] trait behind another variant.
    #[default]
    Memory,
}

impl StoreConfig {
    /// Build the configured backend.
    #[must_use]
    pub fn build(&self) -> Arc<dyn Store> {
        match self {
            Self::Memory => Arc::new(MemoryStore::new()),
        }
    }
}
