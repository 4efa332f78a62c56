// SPDX-License-Identifier: GPL-3.0-or-later
pub mod discovery;
pub mod pending;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use sitesub_application::ReviewError;
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

/// Envelope returned by every review and discovery endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CredentialQuery {
    /// Configured API token
    #[serde(default)]
    pub apikey: String,
}

pub(crate) fn status_for(err: &ReviewError) -> StatusCode {
    match err {
        ReviewError::Unauthorized => StatusCode::UNAUTHORIZED,
        ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
        ReviewError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        ReviewError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn review_error(err: ReviewError) -> Response {
    let status = status_for(&err);
    warn!(target: "api", status = status.as_u16(), error = %err, "review request failed");
    (status, Json(ApiResponse::failed(err.to_string()))).into_response()
}
