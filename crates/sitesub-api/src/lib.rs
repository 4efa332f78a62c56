// SPDX-License-Identifier: GPL-3.0-or-later
pub mod handlers;

use axum::{
    routing::{get, post},
    Json, Router,
};
use handlers::discovery::{run_discovery, DiscoveryRunResponse, __path_run_discovery};
use handlers::pending::{
    confirm_pending, ignore_pending, list_pending, PendingItem, PendingListResponse,
    __path_confirm_pending, __path_ignore_pending, __path_list_pending,
};
use handlers::ApiResponse;
use serde::Serialize;
use sitesub_application::AppState;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_pending,
        confirm_pending,
        ignore_pending,
        run_discovery,
    ),
    components(
        schemas(
            HealthResponse,
            ApiResponse,
            PendingItem,
            PendingListResponse,
            DiscoveryRunResponse,
        )
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "review", description = "Confirm or ignore pending discoveries"),
        (name = "discovery", description = "On-demand discovery runs")
    ),
    info(
        title = "sitesub API",
        version = "0.1.0",
        description = "Site resource discovery and subscription service",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let api_v1 = Router::new()
        .route("/pending", get(list_pending))
        .route("/pending/confirm", get(confirm_pending))
        .route("/pending/ignore", get(ignore_pending))
        .route("/discovery/run", post(run_discovery));

    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi))
        .with_state(state)
}
