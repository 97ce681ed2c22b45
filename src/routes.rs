// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{lab, results, session, student},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (labs, students, session, results).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, bank, store, engine).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
        HeaderValue::from_static("tauri://localhost"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let lab_routes = Router::new()
        .route("/", get(lab::list_labs))
        .route("/{id}", get(lab::get_lab));

    let student_routes = Router::new()
        .route("/", post(student::login))
        .route("/{id}/history", get(student::history));

    let session_routes = Router::new()
        .route("/", get(session::current))
        .route("/start", post(session::start))
        .route("/questions/{index}", get(session::question))
        .route("/answers/{index}", put(session::answer))
        .route("/unanswered", get(session::unanswered))
        .route("/finalize", post(session::finalize))
        .route("/close", post(session::close));

    let result_routes = Router::new()
        .route("/", get(results::list_results))
        .route("/{attempt_id}", get(results::attempt_details));

    Router::new()
        .nest("/api/labs", lab_routes)
        .nest("/api/students", student_routes)
        .nest("/api/session", session_routes)
        .nest("/api/results", result_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
