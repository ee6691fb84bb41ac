//! In-memory relays for tests.
//!
//! A [`MemoryConnector`] hands out connections to relays that live in a shared
//! map. Each relay has a [`RelayBehaviour`] that scripts how it misbehaves:
//! refusing connections, answering slowly, rejecting publishes or failing
//! queries. Events published to a relay are stored and served back to later
//! queries, so a full publish-then-read flow can run without a network.

use crate::error::{ClientError, Result};
use crate::message::Filter;
use crate::relay::{Connector, PublishConfirmation, RelayHandle};
use async_trait::async_trait;
use nostr::{Event, sort_events};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Scripted behaviour of one in-memory relay.
#[derive(Debug, Clone, Default)]
pub struct RelayBehaviour {
    /// Refuse every connection attempt
    pub unreachable: bool,
    /// Delay applied to every publish and query
    pub latency: Duration,
    /// Reject publishes with this message
    pub reject_publish: Option<String>,
    /// Fail every query after connecting
    pub fail_queries: bool,
}

impl RelayBehaviour {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject_publish: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failing_queries() -> Self {
        Self {
            fail_queries: true,
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[derive(Debug, Default)]
struct MemoryRelay {
    behaviour: RelayBehaviour,
    events: Vec<Event>,
    open_connections: usize,
    connection_attempts: usize,
}

type Relays = Arc<Mutex<HashMap<String, MemoryRelay>>>;

fn lock(relays: &Relays) -> MutexGuard<'_, HashMap<String, MemoryRelay>> {
    relays.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector over a set of in-memory relays. Unknown URLs are unreachable.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    relays: Relays,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relay with the given behaviour.
    pub fn with_relay(self, url: impl Into<String>, behaviour: RelayBehaviour) -> Self {
        lock(&self.relays).insert(
            url.into(),
            MemoryRelay {
                behaviour,
                ..MemoryRelay::default()
            },
        );
        self
    }

    /// Store an event on a relay directly, bypassing publish.
    pub fn insert_event(&self, url: &str, event: Event) {
        if let Some(relay) = lock(&self.relays).get_mut(url) {
            store(&mut relay.events, event);
        }
    }

    /// Events currently stored on a relay.
    pub fn events(&self, url: &str) -> Vec<Event> {
        lock(&self.relays)
            .get(url)
            .map(|relay| relay.events.clone())
            .unwrap_or_default()
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self, url: &str) -> usize {
        lock(&self.relays)
            .get(url)
            .map_or(0, |relay| relay.open_connections)
    }

    /// Connection attempts made against a relay, including refused ones.
    pub fn connection_attempts(&self, url: &str) -> usize {
        lock(&self.relays)
            .get(url)
            .map_or(0, |relay| relay.connection_attempts)
    }
}

fn store(events: &mut Vec<Event>, event: Event) {
    if !events.iter().any(|e| e.id == event.id) {
        events.push(event);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayHandle>> {
        let mut relays = lock(&self.relays);
        let relay = relays
            .get_mut(url)
            .ok_or_else(|| ClientError::Connection(format!("unknown relay {}", url)))?;
        relay.connection_attempts += 1;
        if relay.behaviour.unreachable {
            return Err(ClientError::Connection(format!("{} refused connection", url)));
        }
        relay.open_connections += 1;

        Ok(Box::new(MemoryHandle {
            url: url.to_string(),
            behaviour: relay.behaviour.clone(),
            relays: Arc::clone(&self.relays),
        }))
    }
}

struct MemoryHandle {
    url: String,
    behaviour: RelayBehaviour,
    relays: Relays,
}

impl MemoryHandle {
    async fn delay(&self) {
        if !self.behaviour.latency.is_zero() {
            tokio::time::sleep(self.behaviour.latency).await;
        }
    }
}

#[async_trait]
impl RelayHandle for MemoryHandle {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&mut self, event: &Event) -> Result<PublishConfirmation> {
        self.delay().await;

        if let Some(message) = &self.behaviour.reject_publish {
            return Ok(PublishConfirmation {
                event_id: event.id.clone(),
                accepted: false,
                message: message.clone(),
            });
        }

        if let Some(relay) = lock(&self.relays).get_mut(&self.url) {
            store(&mut relay.events, event.clone());
        }
        Ok(PublishConfirmation {
            event_id: event.id.clone(),
            accepted: true,
            message: String::new(),
        })
    }

    async fn query(&mut self, filters: &[Filter]) -> Result<Vec<Event>> {
        self.delay().await;

        if self.behaviour.fail_queries {
            return Err(ClientError::RelayError(format!(
                "{} failed the subscription",
                self.url
            )));
        }

        let relays = lock(&self.relays);
        let stored = relays
            .get(&self.url)
            .map(|relay| relay.events.as_slice())
            .unwrap_or_default();

        let mut matched = Vec::new();
        for filter in filters {
            let mut hits: Vec<Event> = stored
                .iter()
                .filter(|event| filter.matches(event))
                .cloned()
                .collect();
            sort_events(&mut hits);
            if let Some(limit) = filter.limit {
                hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            }
            for event in hits {
                store(&mut matched, event);
            }
        }
        Ok(matched)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(relay) = lock(&self.relays).get_mut(&self.url) {
            relay.open_connections = relay.open_connections.saturating_sub(1);
        }
        Ok(())
    }
}
