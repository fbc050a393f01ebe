//! # Server Module
//!
//! The gateway front door: routes, handlers, and middleware. Thin by
//! design; all protocol work happens in the streaming pipelines.

pub mod handlers;
pub mod state;

pub use handlers::chat_completions;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{self, TraceLayer},
};
use tracing::Level;

/// Create router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Main API endpoint for chat completions
        .route("/v1/chat/completions", post(chat_completions))
        // Health check endpoint for monitoring
        .route("/health", get(handlers::health_check))
        // Middleware stack: request tracing and permissive CORS. No
        // response compression; buffering would delay SSE frames.
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
