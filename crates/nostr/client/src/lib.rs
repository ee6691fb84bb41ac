//! Multi-relay Nostr client.
//!
//! This crate provides:
//! - Message parsing and filters (NIP-01 relay protocol)
//! - Short-lived WebSocket connections to single relays
//! - Fan-out of one operation to many relays with per-relay outcomes
//! - Race reads that take the first relay, in configured order, with data
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_client::{Filter, RelayPool};
//!
//! #[tokio::main]
//! async fn main() -> nostr_client::Result<()> {
//!     let pool = RelayPool::default();
//!     let relays = vec![
//!         "wss://relay.damus.io".to_string(),
//!         "wss://nos.lol".to_string(),
//!     ];
//!
//!     let filter = Filter::new().kinds([30009]).limit(10);
//!     match pool.race_query(&relays, vec![filter]).await? {
//!         Some(events) => println!("{} badge definitions", events.len()),
//!         None => println!("no relay had any"),
//!     }
//!     Ok(())
//! }
//! ```

mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
mod message;
mod pool;
mod relay;
mod subscription;

pub use error::{ClientError, Result};
pub use message::{ClientMessage, Filter, MessageError, RelayMessage};
pub use pool::{FetchEvents, FetchFirst, Outcome, Publish, RelayOperation, RelayOutcome, RelayPool};
pub use relay::{
    Connector, PublishConfirmation, RelayConfig, RelayConnection, RelayHandle, WsConnector,
    validate_relay_url,
};
pub use subscription::generate_subscription_id;
