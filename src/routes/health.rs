use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::sensors::SensorHub;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when every source is available, "degraded" otherwise)
    pub status: String,
    /// API version
    pub version: String,
    /// Number of sources whose last refresh succeeded
    pub sources_available: usize,
    pub sources_total: usize,
}

/// Health check endpoint.
///
/// Returns status "degraded" (still 200) when any upstream source is
/// currently failing, so monitors can tell partial failures apart.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health_check(State(hub): State<SensorHub>) -> Json<HealthResponse> {
    let sources = hub.sources().all();
    let mut available = 0;
    for source in sources {
        if source.is_available().await {
            available += 1;
        }
    }

    Json(HealthResponse {
        status: if available == sources.len() {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        sources_available: available,
        sources_total: sources.len(),
    })
}
