pub mod config;
pub mod error;
pub mod host;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "pNode Agent API",
        version = "0.1.0",
        description = "Node management agent: upgrade orchestration, session control, disk dedication and node identity"
    ),
    paths(
        routes::health_check,
        routes::list_sessions,
        routes::cancel_session,
        routes::dedicate,
        routes::get_dedicated_space,
        routes::network_speed,
        routes::server_info,
        routes::generate_keypair,
        routes::get_keypair,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::SessionInfo,
        routes::CancelResponse,
        routes::DedicatedSpaceResponse,
        routes::NetworkReport,
        routes::KeypairResponse,
        host::ServerInfo,
        error::ErrorResponse,
        node_core::SessionId,
        node_core::DedicationRequest,
        node_core::DedicationResponse,
        events::RunEvent,
        events::EventKind,
        events::RunStatus,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Running orchestration sessions"),
        (name = "dedication", description = "Disk space dedication"),
        (name = "host", description = "Host identity and network throughput"),
        (name = "keypair", description = "Node keypair"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route("/api/sessions", get(routes::list_sessions))
        .route("/api/sessions/{id}/cancel", post(routes::cancel_session))
        .route(
            "/api/dedicate",
            get(routes::get_dedicated_space).post(routes::dedicate),
        )
        .route("/api/network", get(routes::network_speed))
        .route("/api/server-info", get(routes::server_info))
        .route("/api/keypair", get(routes::get_keypair))
        .route("/api/keypair/generate", post(routes::generate_keypair))
        .route("/ws", get(routes::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
