//! Single relay connection management
//!
//! A [`RelayConnection`] is one WebSocket session with one relay. It is opened
//! by a [`Connector`], used for a single operation (publish an event or run one
//! subscription until EOSE) and closed again. The [`RelayHandle`] and
//! [`Connector`] traits are the seam the fan-out engine works against, so the
//! engine can be driven by in-memory relays in tests.

use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, Filter, RelayMessage};
use crate::subscription::generate_subscription_id;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use nostr::{Event, verify_event};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// Confirmation result for event publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfirmation {
    /// Event ID that was published
    pub event_id: String,
    /// Whether the relay accepted the event
    pub accepted: bool,
    /// Message from the relay (empty if accepted, error message if rejected)
    pub message: String,
}

/// Relay connection configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// How long to wait for an OK after publishing, or for EOSE after a REQ
    pub ack_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
        }
    }
}

/// An open connection to one relay.
#[async_trait]
pub trait RelayHandle: Send {
    /// Relay URL this handle is connected to
    fn url(&self) -> &str;

    /// Publish an event and wait for the relay's OK.
    async fn publish(&mut self, event: &Event) -> Result<PublishConfirmation>;

    /// Run one subscription until the relay signals end of stored events.
    async fn query(&mut self, filters: &[Filter]) -> Result<Vec<Event>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections to relays.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayHandle>>;
}

/// Connector that opens real WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: RelayConfig,
}

impl WsConnector {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayHandle>> {
        let conn = RelayConnection::connect(url, self.config.clone()).await?;
        Ok(Box::new(conn))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay connection
pub struct RelayConnection {
    /// Relay URL as configured
    url: String,
    config: RelayConfig,
    ws: WsStream,
}

/// Check that a relay address is a ws:// or wss:// URL.
pub fn validate_relay_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(ClientError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

impl RelayConnection {
    /// Connect to the relay
    pub async fn connect(url: &str, config: RelayConfig) -> Result<Self> {
        let parsed = validate_relay_url(url)?;

        info!("Connecting to relay: {}", url);
        let connect_start = Instant::now();

        let ws = match timeout(config.connect_timeout, connect_async(parsed.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(ClientError::WebSocket(e.to_string())),
            Err(_) => {
                return Err(ClientError::Timeout(format!(
                    "Connection timeout after {:?}",
                    config.connect_timeout
                )));
            }
        };

        info!(
            "Connected to relay: {} (took {:?})",
            url,
            connect_start.elapsed()
        );

        Ok(Self {
            url: url.to_string(),
            config,
            ws,
        })
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let json = msg.to_json()?;
        debug!("Sending to {}: {}", self.url, json);
        self.ws
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }

    /// Next relay message. Control frames and unparseable text are skipped.
    async fn recv(&mut self) -> Result<RelayMessage> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => match RelayMessage::from_json(text.as_str()) {
                    Ok(msg) => return Ok(msg),
                    Err(e) => debug!("Ignoring message from {}: {}", self.url, e),
                },
                Some(Ok(Message::Ping(data))) => {
                    self.ws
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| ClientError::WebSocket(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ClientError::Connection(format!(
                        "relay {} closed connection",
                        self.url
                    )));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ClientError::WebSocket(e.to_string())),
            }
        }
    }

    async fn await_ok(&mut self, event_id: &str) -> Result<PublishConfirmation> {
        loop {
            match self.recv().await? {
                RelayMessage::Ok {
                    event_id: id,
                    success,
                    message,
                } if id == event_id => {
                    return Ok(PublishConfirmation {
                        event_id: id,
                        accepted: success,
                        message,
                    });
                }
                RelayMessage::Notice { message } => {
                    debug!("Notice from {}: {}", self.url, message);
                }
                _ => {}
            }
        }
    }

    async fn collect_until_eose(&mut self, subscription_id: &str) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        loop {
            match self.recv().await? {
                RelayMessage::Event {
                    subscription_id: sub,
                    event,
                } if sub == subscription_id => match verify_event(&event) {
                    Ok(true) => events.push(event),
                    _ => warn!("Dropping unverifiable event {} from {}", event.id, self.url),
                },
                RelayMessage::Eose {
                    subscription_id: sub,
                } if sub == subscription_id => return Ok(events),
                RelayMessage::Closed {
                    subscription_id: sub,
                    message,
                } if sub == subscription_id => {
                    debug!("Subscription {} closed by {}: {}", sub, self.url, message);
                    return Ok(events);
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl RelayHandle for RelayConnection {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&mut self, event: &Event) -> Result<PublishConfirmation> {
        self.send(&ClientMessage::Event(event.clone())).await?;

        let ack_timeout = self.config.ack_timeout;
        let confirmation = timeout(ack_timeout, self.await_ok(&event.id))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!("no OK for {} after {:?}", event.id, ack_timeout))
            })??;

        if confirmation.accepted {
            info!("{} accepted event {}", self.url, event.id);
        } else {
            warn!(
                "{} rejected event {}: {}",
                self.url, event.id, confirmation.message
            );
        }
        Ok(confirmation)
    }

    async fn query(&mut self, filters: &[Filter]) -> Result<Vec<Event>> {
        let subscription_id = generate_subscription_id();
        self.send(&ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filters: filters.to_vec(),
        })
        .await?;

        let ack_timeout = self.config.ack_timeout;
        let events = timeout(ack_timeout, self.collect_until_eose(&subscription_id))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "no EOSE for {} after {:?}",
                    subscription_id, ack_timeout
                ))
            })??;

        if let Err(e) = self.send(&ClientMessage::Close { subscription_id }).await {
            debug!("Failed to close subscription on {}: {}", self.url, e);
        }

        debug!("{} returned {} events", self.url, events.len());
        Ok(events)
    }

    async fn close(&mut self) -> Result<()> {
        self.ws
            .close(None)
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }
}
