// src/routes.rs

use axum::{
    Json, Router,
    http::Method,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    docs,
    handlers::{attempts, auth, chat, chat_sessions, exam_results, exams, profile},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Public: signup, login, health, OpenAPI document.
/// * Everything else sits behind the auth middleware.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        // The auth cookie has to survive the cross-origin dev setup.
        .allow_credentials(true);

    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/health", get(health))
        .route("/api/openapi.json", get(docs::openapi_json));

    let attempt_routes = Router::new()
        .route(
            "/{subject}",
            post(attempts::create_attempt)
                .get(attempts::get_attempt)
                .delete(attempts::abandon_attempt),
        )
        .route("/{subject}/start", post(attempts::start_attempt))
        .route("/{subject}/answer", put(attempts::put_answer))
        .route("/{subject}/submit", post(attempts::submit_attempt));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/user/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/api/user/stats", get(profile::get_stats))
        .route(
            "/api/chat-sessions",
            get(chat_sessions::list_sessions)
                .post(chat_sessions::save_session)
                .delete(chat_sessions::delete_sessions),
        )
        .route("/api/chat-sessions/{id}", get(chat_sessions::get_session))
        .route(
            "/api/exam-results",
            get(exam_results::list_results).post(exam_results::create_result),
        )
        .route("/api/exam-results/{id}", get(exam_results::get_result))
        .route("/api/chat", post(chat::chat))
        .route("/api/generate-exam", post(exams::generate_exam))
        .route("/api/grade-exam", post(exams::grade_exam))
        .nest("/api/exam-attempts", attempt_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Global middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness probe. Deliberately does not touch the database, so a down
/// Postgres reports alive-but-degraded through 503s on real endpoints.
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
