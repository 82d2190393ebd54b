pub mod error;
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
        title = "LeadLens Scan API",
        version = "0.1.0",
        description = "API for the LeadLens scan engine - multi-phase opportunity analysis"
    ),
    paths(
        routes::health_check,
        routes::trigger_scan,
        routes::list_scans,
        routes::get_scan,
        routes::answer_scan,
        routes::cancel_scan,
        routes::delete_scan,
        routes::sse::scan_events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::TriggerScanRequest,
        routes::AnswerRequest,
        routes::OkResponse,
        routes::DeleteResponse,
        leadlens_core::RunSnapshot,
        leadlens_core::RunStatus,
        leadlens_core::ScanSubject,
        leadlens_core::PendingQuestion,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "scans", description = "Scan run management and progress streaming"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/api/scans",
            get(routes::list_scans).post(routes::trigger_scan),
        )
        .route(
            "/api/scans/{id}",
            get(routes::get_scan).delete(routes::delete_scan),
        )
        .route("/api/scans/{id}/answer", post(routes::answer_scan))
        .route("/api/scans/{id}/cancel", post(routes::cancel_scan))
        .route("/api/scans/{id}/events", get(routes::sse::scan_events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
