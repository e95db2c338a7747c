// F1 Sensor v0.1
use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use services::fetcher::{HttpFetcher, JsonFetcher};
use services::sensors::{SensorHub, SensorKind, Sources};
use services::weather::WeatherSensor;

/// F1 Sensor API: OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "F1 Sensor API",
        version = "0.1.0",
        description = "Formula 1 schedule, standings and results sensors plus race-day \
            weather for the next circuit. Polls the Ergast-compatible Jolpica API and \
            the met.no Locationforecast API, caches the latest responses in memory and \
            derives sensor values from them on every read.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Sensors", description = "Derived sensor values and attributes"),
        (name = "Sources", description = "Upstream data sources and manual refresh"),
    ),
    paths(
        routes::health::health_check,
        routes::sensors::list_sensors,
        routes::sensors::get_sensor,
        routes::sources::list_sources,
        routes::sources::refresh_source,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            services::sensors::SensorReading,
            services::coordinator::SourceStatus,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "f1_sensor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let fetcher: Arc<dyn JsonFetcher> = Arc::new(
        HttpFetcher::new(&config.weather_user_agent).expect("Failed to build HTTP client"),
    );

    // Sources are loaded one after another; the resolver needs the schedule.
    let sources = Sources::start(&config, fetcher.clone(), Utc::now()).await;

    let weather = config
        .enabled_sensors
        .contains(&SensorKind::Weather)
        .then(|| {
            WeatherSensor::attach(
                sources.schedule.clone(),
                fetcher.clone(),
                config.weather_api_base_url.clone(),
            )
        });

    // Spawn refresh loops
    for source in sources.all() {
        tokio::spawn(source.clone().run());
    }

    let hub = SensorHub::new(
        config.sensor_name.clone(),
        config.enabled_sensors.clone(),
        sources,
        weather,
    );
    tracing::info!(
        "Enabled sensors: {}",
        hub.enabled()
            .iter()
            .map(|kind| kind.key())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // CORS: reads plus the manual refresh trigger
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/sensors", get(routes::sensors::list_sensors))
        .route("/api/v1/sensors/:key", get(routes::sensors::get_sensor))
        .route("/api/v1/sources", get(routes::sources::list_sources))
        .route(
            "/api/v1/sources/:name/refresh",
            post(routes::sources::refresh_source),
        )
        .with_state(hub);

    let app = Router::new()
        .merge(api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
