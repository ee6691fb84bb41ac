//! HTTP surface of the badge service.

pub mod cache;
pub mod error;
pub mod handlers;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use nostr_client::RelayPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::BadgeError;
use crate::identity::Identities;
use crate::issuance::BadgeIssuer;
use crate::queries::BadgeQueries;
use crate::relays::RelayRegistry;
use cache::cache_responses;
pub use cache::ResponseCache;
use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub relays: Arc<RelayRegistry>,
    pub identities: Arc<Identities>,
    pub queries: BadgeQueries,
    pub issuer: BadgeIssuer,
    pub cache: Arc<ResponseCache>,
}

impl AppState {
    pub fn new(pool: RelayPool, relays: RelayRegistry, cache: ResponseCache) -> Self {
        let relays = Arc::new(relays);
        let identities = Arc::new(Identities::new());
        Self {
            queries: BadgeQueries::new(pool.clone(), Arc::clone(&relays)),
            issuer: BadgeIssuer::new(pool, Arc::clone(&relays), Arc::clone(&identities)),
            cache: Arc::new(cache),
            relays,
            identities,
        }
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    info!("{} {}", request.method(), request.uri().path());
    next.run(request).await
}

/// Badge routes are refused before any relay is contacted while the relay
/// list is empty.
async fn require_relays(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.relays.is_configured() {
        return ApiError::from(BadgeError::NoRelays).into_response();
    }
    next.run(request).await
}

pub fn app_router(state: AppState) -> Router {
    let badge_routes = Router::new()
        .route("/badge-definition", post(handlers::create_definition))
        .route("/badge-definition/:pk", get(handlers::definitions_by_author))
        .route(
            "/badge-award",
            get(handlers::all_awards).post(handlers::award_badge),
        )
        .route("/badge-award/:pk", get(handlers::awards_for_pubkey))
        .route("/badge-accepted", get(handlers::all_accepted))
        .route("/badge-accepted/:pk", get(handlers::accepted_for_pubkey))
        .route("/badge-profile", post(handlers::accept_badges))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_relays));

    Router::new()
        .route("/setup-issuer", post(handlers::setup_issuer))
        .route("/setup-receiver", post(handlers::setup_receiver))
        .route(
            "/relay-config",
            get(handlers::get_relay_config).post(handlers::set_relay_config),
        )
        .merge(badge_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cache_responses,
        ))
        .layer(middleware::from_fn(log_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
