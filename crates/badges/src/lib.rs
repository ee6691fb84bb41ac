//! NIP-58 badge service.
//!
//! Issues badge definitions, awards and acceptance declarations to every
//! configured relay, and answers badge queries by race-reading the relays in
//! configured order and reconciling awards against acceptances locally.
//!
//! ```no_run
//! use badges::{AppState, RelayRegistry, ResponseCache, app_router};
//! use nostr_client::RelayPool;
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let relays = RelayRegistry::with_relays(vec!["wss://relay.damus.io".to_string()])?;
//! let cache = ResponseCache::new(Duration::from_secs(40));
//! let state = AppState::new(RelayPool::default(), relays, cache);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app_router(state)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod issuance;
pub mod queries;
pub mod reconcile;
pub mod relays;
pub mod server;

pub use config::Settings;
pub use error::{BadgeError, Result};
pub use identity::{Identities, Identity, Role};
pub use issuance::{BadgeIssuer, PublishReport};
pub use queries::{BadgeQueries, TimeRange};
pub use reconcile::{AcceptanceIndex, ExtendedAward, extend_awards, reconcile};
pub use relays::RelayRegistry;
pub use server::{AppState, ResponseCache, app_router};
