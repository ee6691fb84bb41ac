//! The process-wide relay list.

use crate::error::{BadgeError, Result};
use nostr_client::validate_relay_url;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Relay list shared by every request. Replaced wholesale, read as a snapshot
/// so a call keeps the list it started with.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    relays: RwLock<Arc<Vec<String>>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with a list, validated like [`RelayRegistry::replace`].
    /// An empty list is allowed here and leaves the registry unconfigured.
    pub fn with_relays(relays: Vec<String>) -> Result<Self> {
        let registry = Self::new();
        if !relays.is_empty() {
            registry.replace(relays)?;
        }
        Ok(registry)
    }

    /// Current list, possibly empty.
    pub fn list(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.relays.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current list for a relay call. Fails when no relays are configured.
    pub fn snapshot(&self) -> Result<Arc<Vec<String>>> {
        let relays = self.list();
        if relays.is_empty() {
            return Err(BadgeError::NoRelays);
        }
        Ok(relays)
    }

    pub fn is_configured(&self) -> bool {
        !self.list().is_empty()
    }

    /// Replace the whole list. Order is kept as given.
    pub fn replace(&self, relays: Vec<String>) -> Result<()> {
        if relays.is_empty() {
            return Err(BadgeError::Validation(
                "Please provide list of relays.".to_string(),
            ));
        }
        for relay in &relays {
            validate_relay_url(relay)
                .map_err(|e| BadgeError::Validation(format!("Invalid relay {}: {}", relay, e)))?;
        }

        info!("Relay list replaced: {:?}", relays);
        *self.relays.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(relays);
        Ok(())
    }
}
