pub mod protocol;
pub mod rest;
pub mod state;

use crate::config::ConfigError;
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use rest::{
    attendance_by_date_handler, course_attendance_handler, daily_stats_handler,
    export_attendance_handler, health_handler, mark_attendance_handler, not_found_handler,
    recompute_summary_handler, replay_jobs_handler, student_attendance_handler,
    update_attendance_handler, ApiDoc,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the CORS policy for the configured origin. `*` allows any origin.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);
    if origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }
    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))?;
    Ok(layer.allow_origin(origin))
}

/// The complete application: REST routes, CORS, request tracing and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Result<Router, ConfigError> {
    let cors = cors_layer(&app_state.config.cors_origin)?;

    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/attendance",
            post(mark_attendance_handler).put(update_attendance_handler),
        )
        .route("/courses/{course_id}/attendance", get(course_attendance_handler))
        .route(
            "/courses/{course_id}/attendance/{date}",
            get(attendance_by_date_handler),
        )
        .route(
            "/courses/{course_id}/attendance/{date}/stats",
            get(daily_stats_handler),
        )
        .route(
            "/students/{student_id}/attendance",
            get(student_attendance_handler),
        )
        .route(
            "/students/{student_id}/attendance/export",
            get(export_attendance_handler),
        )
        .route(
            "/students/{student_id}/attendance/recompute",
            post(recompute_summary_handler),
        )
        .route("/maintenance/summary-jobs/replay", post(replay_jobs_handler))
        .with_state(app_state);

    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(not_found_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
