//! Fan-out and race over a list of relays.
//!
//! Every call opens one short-lived connection per relay in its own task, runs
//! a single [`RelayOperation`] on it and closes it again. [`RelayPool::broadcast`]
//! waits for every relay and reports one [`RelayOutcome`] per relay in input
//! order. [`RelayPool::race`] returns the result of the first relay, in input
//! order, that connected and produced data; relays behind the winner are left
//! to finish in the background.

use crate::error::{ClientError, Result};
use crate::message::Filter;
use crate::relay::{Connector, RelayHandle, WsConnector};
use async_trait::async_trait;
use futures::future::join_all;
use nostr::{Event, sort_events, verify_event};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Terminal state of one relay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The connection could not be opened
    NotConnected,
    /// Connected, but the operation failed
    Failed,
    /// Connected and the operation produced a result
    Completed(T),
}

/// Outcome of one operation against one relay.
///
/// Serializes as `{"relay", "connected", "result"}` where `result` is `null`
/// when the relay was never reached and `false` when the operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome<T> {
    pub relay: String,
    pub outcome: Outcome<T>,
}

impl<T> RelayOutcome<T> {
    pub fn new(relay: impl Into<String>, outcome: Outcome<T>) -> Self {
        Self {
            relay: relay.into(),
            outcome,
        }
    }

    pub fn connected(&self) -> bool {
        !matches!(self.outcome, Outcome::NotConnected)
    }

    /// Result of a completed operation.
    pub fn result(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Completed(value) => Some(value),
            Outcome::NotConnected | Outcome::Failed => None,
        }
    }

    pub fn into_result(self) -> Option<T> {
        match self.outcome {
            Outcome::Completed(value) => Some(value),
            Outcome::NotConnected | Outcome::Failed => None,
        }
    }
}

impl<T: Serialize> Serialize for RelayOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RelayOutcome", 3)?;
        state.serialize_field("relay", &self.relay)?;
        state.serialize_field("connected", &self.connected())?;
        match &self.outcome {
            Outcome::NotConnected => state.serialize_field("result", &None::<T>)?,
            Outcome::Failed => state.serialize_field("result", &false)?,
            Outcome::Completed(value) => state.serialize_field("result", value)?,
        }
        state.end()
    }
}

/// One unit of work run against a single open relay connection.
#[async_trait]
pub trait RelayOperation: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn run(&self, relay: &mut dyn RelayHandle) -> Result<Self::Output>;
}

/// Publish an event. Completes with `true` once the relay accepts it; a
/// rejection is an operation failure.
#[derive(Debug, Clone)]
pub struct Publish(pub Event);

#[async_trait]
impl RelayOperation for Publish {
    type Output = bool;

    async fn run(&self, relay: &mut dyn RelayHandle) -> Result<bool> {
        let confirmation = relay.publish(&self.0).await?;
        if confirmation.accepted {
            Ok(true)
        } else {
            Err(ClientError::RelayError(confirmation.message))
        }
    }
}

/// Fetch every event matching the filters. No matches count as no data.
#[derive(Debug, Clone)]
pub struct FetchEvents {
    pub filters: Vec<Filter>,
}

#[async_trait]
impl RelayOperation for FetchEvents {
    type Output = Option<Vec<Event>>;

    async fn run(&self, relay: &mut dyn RelayHandle) -> Result<Option<Vec<Event>>> {
        let events = relay.query(&self.filters).await?;
        Ok((!events.is_empty()).then_some(events))
    }
}

/// Fetch the newest event matching the filters.
#[derive(Debug, Clone)]
pub struct FetchFirst {
    pub filters: Vec<Filter>,
}

#[async_trait]
impl RelayOperation for FetchFirst {
    type Output = Option<Event>;

    async fn run(&self, relay: &mut dyn RelayHandle) -> Result<Option<Event>> {
        let mut events = relay.query(&self.filters).await?;
        sort_events(&mut events);
        Ok(events.into_iter().next())
    }
}

/// Runs relay operations across a list of relays.
#[derive(Clone)]
pub struct RelayPool {
    connector: Arc<dyn Connector>,
}

impl RelayPool {
    pub fn new(connector: impl Connector) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    fn spawn_attempts<O: RelayOperation>(
        &self,
        relays: &[String],
        op: O,
    ) -> Result<Vec<JoinHandle<RelayOutcome<O::Output>>>> {
        if relays.is_empty() {
            return Err(ClientError::NoRelays);
        }

        let op = Arc::new(op);
        Ok(relays
            .iter()
            .map(|url| {
                tokio::spawn(attempt(
                    Arc::clone(&self.connector),
                    url.clone(),
                    Arc::clone(&op),
                ))
            })
            .collect())
    }

    /// Run `op` against every relay concurrently.
    ///
    /// Returns exactly one outcome per relay, in the order of `relays`, once
    /// every relay has finished. Individual relay failures are recorded in the
    /// outcomes and never fail the call. A relay task that panics is reported
    /// as [`Outcome::Failed`].
    pub async fn broadcast<O: RelayOperation>(
        &self,
        relays: &[String],
        op: O,
    ) -> Result<Vec<RelayOutcome<O::Output>>> {
        let handles = self.spawn_attempts(relays, op)?;

        let outcomes = join_all(handles)
            .await
            .into_iter()
            .zip(relays)
            .map(|(joined, url)| {
                // a task only dies inside the operation, after it connected
                joined.unwrap_or_else(|e| {
                    warn!("Relay task for {} did not finish: {}", url, e);
                    RelayOutcome::new(url.clone(), Outcome::Failed)
                })
            })
            .collect();
        Ok(outcomes)
    }

    /// Run a read against every relay concurrently and return the result of
    /// the first relay, in the order of `relays`, that connected and returned
    /// data. `None` means no relay qualified.
    pub async fn race<T, O>(&self, relays: &[String], op: O) -> Result<Option<T>>
    where
        T: Send + 'static,
        O: RelayOperation<Output = Option<T>>,
    {
        let handles = self.spawn_attempts(relays, op)?;

        for (handle, url) in handles.into_iter().zip(relays) {
            match handle.await {
                Ok(RelayOutcome {
                    outcome: Outcome::Completed(Some(value)),
                    ..
                }) => {
                    debug!("Race won by {}", url);
                    return Ok(Some(value));
                }
                Ok(_) => debug!("{} had no data", url),
                Err(e) => warn!("Relay task for {} did not finish: {}", url, e),
            }
        }

        debug!("No relay out of {} returned data", relays.len());
        Ok(None)
    }

    /// Verify an event and publish it to every relay.
    pub async fn broadcast_publish(
        &self,
        relays: &[String],
        event: Event,
    ) -> Result<Vec<RelayOutcome<bool>>> {
        match verify_event(&event) {
            Ok(true) => {}
            Ok(false) => {
                return Err(ClientError::InvalidEvent(format!(
                    "event {} failed verification",
                    event.id
                )));
            }
            Err(e) => return Err(ClientError::InvalidEvent(e.to_string())),
        }

        info!("Publishing event {} to {} relays", event.id, relays.len());
        self.broadcast(relays, Publish(event)).await
    }

    /// Race-read every event matching the filters.
    pub async fn race_query(
        &self,
        relays: &[String],
        filters: Vec<Filter>,
    ) -> Result<Option<Vec<Event>>> {
        self.race(relays, FetchEvents { filters }).await
    }

    /// Race-read the newest event matching the filters.
    pub async fn race_first(&self, relays: &[String], filters: Vec<Filter>) -> Result<Option<Event>> {
        self.race(relays, FetchFirst { filters }).await
    }
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new(WsConnector::default())
    }
}

async fn attempt<O: RelayOperation>(
    connector: Arc<dyn Connector>,
    url: String,
    op: Arc<O>,
) -> RelayOutcome<O::Output> {
    let mut conn = match connector.connect(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            return RelayOutcome::new(url, Outcome::NotConnected);
        }
    };

    let outcome = match op.run(conn.as_mut()).await {
        Ok(value) => Outcome::Completed(value),
        Err(e) => {
            warn!("Operation on {} failed: {}", url, e);
            Outcome::Failed
        }
    };

    if let Err(e) = conn.close().await {
        debug!("Error closing {}: {}", url, e);
    }

    RelayOutcome::new(url, outcome)
}
