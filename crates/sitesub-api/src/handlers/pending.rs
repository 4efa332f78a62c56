// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sitesub_application::AppState;
use sitesub_domain::{HistoryKey, HistoryRecord};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use super::{review_error, ApiResponse, CredentialQuery};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReviewQuery {
    /// History key of the pending record, e.g. `100_S02`
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub apikey: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingItem {
    pub key: String,
    pub title: String,
    pub media_title: String,
    pub media_type: String,
    pub action: String,
    pub source_id: String,
    pub poster_url: Option<String>,
    pub total_episodes: Option<u32>,
    pub latest_episode: Option<u32>,
    pub created_at: String,
}

impl From<HistoryRecord> for PendingItem {
    fn from(record: HistoryRecord) -> Self {
        Self {
            key: record.key.to_string(),
            title: record.title,
            media_title: record.media.title_year(),
            media_type: record.media_type.to_string(),
            action: record.action.to_string(),
            source_id: record.source_id,
            poster_url: record.poster_url,
            total_episodes: record.total_episodes,
            latest_episode: record.latest_episode,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingListResponse {
    pub success: bool,
    pub message: String,
    pub items: Vec<PendingItem>,
}

/// List records awaiting an operator decision, newest first
#[utoipa::path(
    get,
    path = "/api/v1/pending",
    params(CredentialQuery),
    responses(
        (status = 200, description = "Pending records", body = PendingListResponse),
        (status = 401, description = "Invalid api key", body = ApiResponse)
    ),
    tag = "review"
)]
pub async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<CredentialQuery>,
) -> impl IntoResponse {
    match state.review.pending(&query.apikey).await {
        Ok(records) => {
            debug!(target: "api", count = records.len(), "listing pending records");
            let items: Vec<PendingItem> = records.into_iter().map(PendingItem::from).collect();
            (
                StatusCode::OK,
                Json(PendingListResponse {
                    success: true,
                    message: format!("{} pending", items.len()),
                    items,
                }),
            )
                .into_response()
        }
        Err(err) => review_error(err),
    }
}

/// Run the deferred action of a pending record and mark it confirmed
#[utoipa::path(
    get,
    path = "/api/v1/pending/confirm",
    params(ReviewQuery),
    responses(
        (status = 200, description = "Record confirmed", body = ApiResponse),
        (status = 401, description = "Invalid api key", body = ApiResponse),
        (status = 404, description = "No pending record for key", body = ApiResponse),
        (status = 502, description = "Subscription or download failed", body = ApiResponse)
    ),
    tag = "review"
)]
pub async fn confirm_pending(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> impl IntoResponse {
    let key = HistoryKey::from(query.key.as_str());
    debug!(target: "api", %key, "confirm requested");
    match state.review.confirm(&key, &query.apikey).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ApiResponse::ok(format!("{} confirmed", record.log_title()))),
        )
            .into_response(),
        Err(err) => review_error(err),
    }
}

/// Ignore a pending record; it is never offered again
#[utoipa::path(
    get,
    path = "/api/v1/pending/ignore",
    params(ReviewQuery),
    responses(
        (status = 200, description = "Record ignored", body = ApiResponse),
        (status = 401, description = "Invalid api key", body = ApiResponse),
        (status = 404, description = "No pending record for key", body = ApiResponse)
    ),
    tag = "review"
)]
pub async fn ignore_pending(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> impl IntoResponse {
    let key = HistoryKey::from(query.key.as_str());
    debug!(target: "api", %key, "ignore requested");
    match state.review.ignore(&key, &query.apikey).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ApiResponse::ok(format!("{} ignored", record.log_title()))),
        )
            .into_response(),
        Err(err) => review_error(err),
    }
}
