use axum::extract::{Json, Path, Query, State};
use nostr::Event;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use super::error::ApiError;
use crate::identity::Role;
use crate::issuance::PublishReport;
use crate::queries::TimeRange;
use crate::reconcile::ExtendedAward;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub pubkey: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayConfigBody {
    #[serde(default)]
    pub relays: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDefinitionRequest {
    pub sk: Option<String>,
    pub content: Option<String>,
    pub unique_name: Option<String>,
    pub short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardBadgeRequest {
    pub sk: Option<String>,
    pub content: Option<String>,
    pub award_pk: Option<String>,
    pub badge_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBadgesRequest {
    pub sk: Option<String>,
    pub content: Option<String>,
    pub award_ids: Option<Vec<String>>,
}

/// Raw `since`/`until` query parameters. Non-numeric values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl RangeParams {
    fn range(&self) -> TimeRange {
        TimeRange::parse(self.since.as_deref(), self.until.as_deref())
    }
}

fn setup(state: &AppState, role: Role) -> ApiResult<SetupResponse> {
    let pubkey = state
        .identities
        .setup(role)
        .map_err(|e| ApiError(e.into()))?;
    Ok(Json(SetupResponse { pubkey }))
}

pub async fn setup_issuer(State(state): State<AppState>) -> ApiResult<SetupResponse> {
    setup(&state, Role::Issuer)
}

pub async fn setup_receiver(State(state): State<AppState>) -> ApiResult<SetupResponse> {
    setup(&state, Role::Receiver)
}

pub async fn get_relay_config(State(state): State<AppState>) -> Json<RelayConfigBody> {
    Json(RelayConfigBody {
        relays: Some(state.relays.list().to_vec()),
    })
}

pub async fn set_relay_config(
    State(state): State<AppState>,
    Json(body): Json<RelayConfigBody>,
) -> ApiResult<RelayConfigBody> {
    let relays = body.relays.unwrap_or_default();
    state.relays.replace(relays)?;
    state.cache.clear();
    info!("Response cache cleared after relay change");
    Ok(Json(RelayConfigBody {
        relays: Some(state.relays.list().to_vec()),
    }))
}

pub async fn create_definition(
    State(state): State<AppState>,
    Json(request): Json<CreateDefinitionRequest>,
) -> ApiResult<PublishReport> {
    let report = state
        .issuer
        .create_definition(
            request.sk.as_deref(),
            request.unique_name.as_deref(),
            request.short_name.as_deref(),
            request.content.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(report))
}

pub async fn definitions_by_author(
    State(state): State<AppState>,
    Path(pk): Path<String>,
) -> ApiResult<Vec<Event>> {
    Ok(Json(state.queries.definitions_by_author(&pk).await?))
}

pub async fn award_badge(
    State(state): State<AppState>,
    Json(request): Json<AwardBadgeRequest>,
) -> ApiResult<PublishReport> {
    let report = state
        .issuer
        .award_badge(
            request.sk.as_deref(),
            request.award_pk.as_deref(),
            request.badge_id.as_deref(),
            request.content.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(report))
}

pub async fn awards_for_pubkey(
    State(state): State<AppState>,
    Path(pk): Path<String>,
) -> ApiResult<Vec<ExtendedAward>> {
    Ok(Json(state.queries.awards_for_pubkey(&pk).await?))
}

pub async fn accepted_for_pubkey(
    State(state): State<AppState>,
    Path(pk): Path<String>,
) -> ApiResult<Vec<ExtendedAward>> {
    Ok(Json(state.queries.accepted_for_pubkey(&pk).await?))
}

pub async fn all_awards(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Vec<ExtendedAward>> {
    Ok(Json(state.queries.all_awards(params.range()).await?))
}

pub async fn all_accepted(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Vec<ExtendedAward>> {
    Ok(Json(state.queries.all_accepted(params.range()).await?))
}

pub async fn accept_badges(
    State(state): State<AppState>,
    Json(request): Json<AcceptBadgesRequest>,
) -> ApiResult<PublishReport> {
    let report = state
        .issuer
        .accept_badges(
            request.sk.as_deref(),
            request.award_ids.as_deref(),
            request.content.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(report))
}
