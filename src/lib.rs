// src/lib.rs
//! Character chat server: JSON-file storage, prompt assembly and LLM relay.
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm_client;
pub mod middleware;
pub mod models;
pub mod prompt;
pub mod relay;
pub mod sse;
pub mod state;
pub mod storage;
pub mod transcript;
pub mod utils;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use state::AppState;

use axum::{response::Json, routing::get, Extension, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Every API route, uploaded avatars, and the web UI as the fallback.
pub fn build_app(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .merge(handlers::characters::character_routes())
        .merge(handlers::chats::chat_routes())
        .merge(handlers::completion::completion_routes())
        .merge(handlers::upload::upload_routes(&state.config.uploads_dir()))
        .route("/api/status", get(api_status))
        .fallback_service(static_files)
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "llm_api_url": state.llm.api_url(),
    }))
}
