use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use crate::errors::{AppError, ErrorResponse};
use crate::services::sensors::{SensorHub, SensorKind, SensorReading};

/// List every enabled sensor with its current value and attributes.
#[utoipa::path(
    get,
    path = "/api/v1/sensors",
    tag = "Sensors",
    responses(
        (status = 200, description = "All enabled sensors", body = Vec<SensorReading>),
    )
)]
pub async fn list_sensors(State(hub): State<SensorHub>) -> Json<Vec<SensorReading>> {
    Json(hub.read_all(Utc::now()).await)
}

/// Get one sensor by key (e.g. `next_race`, `weather`).
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{key}",
    tag = "Sensors",
    params(
        ("key" = String, Path, description = "Sensor key"),
    ),
    responses(
        (status = 200, description = "Sensor value and attributes", body = SensorReading),
        (status = 404, description = "Unknown or disabled sensor", body = ErrorResponse),
    )
)]
pub async fn get_sensor(
    State(hub): State<SensorHub>,
    Path(key): Path<String>,
) -> Result<Json<SensorReading>, AppError> {
    let kind = key
        .parse::<SensorKind>()
        .map_err(|e| AppError::NotFound(e.to_string()))?;
    hub.read(kind, Utc::now())
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Sensor {} is not enabled", key)))
}
