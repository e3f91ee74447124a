// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, certificate, course, exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, exam, course, certificate, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
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
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/federated", post(auth::federated_login))
        .route("/federated/profile", post(auth::complete_profile));

    let exam_routes = Router::new()
        .route("/{id}", get(exam::get_exam))
        .route("/{id}/start", post(exam::start_attempt))
        .route("/{id}/attempts", get(exam::list_my_attempts))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let attempt_routes = Router::new()
        .route("/{id}", get(exam::get_attempt))
        .route("/{id}/submit", post(exam::submit_attempt))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let course_routes = Router::new()
        .route("/{id}/progress", get(course::course_progress))
        .route("/{id}/certificate", post(certificate::issue_certificate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let module_routes = Router::new()
        .route("/{id}/complete", post(course::complete_module))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let certificate_routes = Router::new()
        .route("/", get(certificate::list_my_certificates))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/accounts", get(admin::list_accounts))
        .route("/accounts/{id}/verify", post(admin::verify_account))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/modules", module_routes)
        .nest("/api/certificates", certificate_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
