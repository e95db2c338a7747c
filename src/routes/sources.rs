//! Source status and manual refresh.
//!
//! GET  /api/v1/sources                 - status of every coordinator
//! POST /api/v1/sources/{name}/refresh  - refresh one coordinator now

use axum::extract::{Path, State};
use axum::Json;
use futures::future::join_all;

use crate::errors::{AppError, ErrorResponse};
use crate::services::coordinator::SourceStatus;
use crate::services::sensors::SensorHub;

/// Get the refresh status of every F1 data source.
#[utoipa::path(
    get,
    path = "/api/v1/sources",
    tag = "Sources",
    responses(
        (status = 200, description = "Per-source refresh status", body = Vec<SourceStatus>),
    )
)]
pub async fn list_sources(State(hub): State<SensorHub>) -> Json<Vec<SourceStatus>> {
    let statuses = join_all(hub.sources().all().map(|source| source.status())).await;
    Json(statuses)
}

/// Refresh one source immediately.
///
/// On failure the cached payload is kept and the upstream error is returned
/// as 502.
#[utoipa::path(
    post,
    path = "/api/v1/sources/{name}/refresh",
    tag = "Sources",
    params(
        ("name" = String, Path, description = "Source name, e.g. race_schedule"),
    ),
    responses(
        (status = 200, description = "Refreshed; new status", body = SourceStatus),
        (status = 404, description = "Unknown source", body = ErrorResponse),
        (status = 502, description = "Upstream fetch failed", body = ErrorResponse),
    )
)]
pub async fn refresh_source(
    State(hub): State<SensorHub>,
    Path(name): Path<String>,
) -> Result<Json<SourceStatus>, AppError> {
    let source = hub
        .sources()
        .by_name(&name)
        .ok_or_else(|| AppError::NotFound(format!("Source {} not found", name)))?;

    tracing::info!("Manual refresh of source {}", name);
    source.refresh().await?;
    Ok(Json(source.status().await))
}
