// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sitesub_application::{AppState, RunError, RunSummary};
use tracing::info;
use utoipa::ToSchema;

use super::{review_error, ApiResponse, CredentialQuery};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiscoveryRunResponse {
    pub success: bool,
    pub message: String,
    pub run_id: Option<String>,
    pub sources: usize,
    pub sources_failed: usize,
    pub candidates: usize,
    pub queued: usize,
    pub subscribed: usize,
    pub downloaded: usize,
    pub failed: usize,
}

impl From<RunSummary> for DiscoveryRunResponse {
    fn from(summary: RunSummary) -> Self {
        Self {
            success: true,
            message: format!(
                "checked {} candidates from {} sources",
                summary.candidates, summary.sources
            ),
            run_id: summary.run_id.map(|id| id.to_string()),
            sources: summary.sources,
            sources_failed: summary.sources_failed,
            candidates: summary.candidates,
            queued: summary.queued,
            subscribed: summary.subscribed,
            downloaded: summary.downloaded,
            failed: summary.failed,
        }
    }
}

/// Trigger a discovery run now and wait for it to finish
#[utoipa::path(
    post,
    path = "/api/v1/discovery/run",
    params(CredentialQuery),
    responses(
        (status = 200, description = "Run finished", body = DiscoveryRunResponse),
        (status = 401, description = "Invalid api key", body = ApiResponse),
        (status = 409, description = "A run is already in progress", body = ApiResponse)
    ),
    tag = "discovery"
)]
pub async fn run_discovery(
    State(state): State<AppState>,
    Query(query): Query<CredentialQuery>,
) -> impl IntoResponse {
    if let Err(err) = state.review.authorize(&query.apikey) {
        return review_error(err);
    }

    info!(target: "api", "manual discovery run requested");
    match state.runner.try_run().await {
        Ok(summary) => (StatusCode::OK, Json(DiscoveryRunResponse::from(summary))).into_response(),
        Err(err @ RunError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::failed(err.to_string())),
        )
            .into_response(),
    }
}
