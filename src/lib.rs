//! Intervention measures tracker.
//!
//! The client core (catalog parsing, state transitions, filtering, reports, the remote gateway
//! and the [`session::Tracker`]) plus the SQLite-backed endpoint service it talks to.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod filter;
pub mod gateway;
pub mod models;
pub mod parser;
pub mod report;
pub mod session;
pub mod store;
pub mod transitions;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/exec", get(api::read_endpoint).post(api::write_endpoint))
        .route("/reports/students/{student_id}", get(api::student_report))
        .route("/reports/classes/{class_id}", get(api::class_report))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
