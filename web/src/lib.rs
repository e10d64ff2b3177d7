//! HTTP and WebSocket surface for the Encore performance queue.
//!
//! Three groups of routes, one per consumer, all under `/api/venues/:venue_id`:
//!
//! - [`operator_router`](handlers::operator_router): lifecycle commands,
//!   reordering, pause control
//! - [`display_router`](handlers::display_router): snapshot and read endpoints
//! - [`singer_router`](handlers::singer_router): submit and track requests
//!
//! plus `GET /api/venues/:venue_id/ws` for change signals and `/health`,
//! `/ready` for probes.
//!
//! # Request Flow
//!
//! 1. **HTTP request** arrives at an Axum handler
//! 2. **Extract** venue/entry ids from the path and the JSON body
//! 3. **Call** the [`QueueEngine`](encore_core::engine::QueueEngine)
//! 4. **Map** the result, or the [`QueueError`](encore_core::error::QueueError)
//!    through [`AppError`], to a response
//!
//! # Example
//!
//! ```ignore
//! let app = encore_web::router(AppState::new(engine));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use state::AppState;

/// Every route, with correlation ids and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::operator_router())
        .merge(handlers::display_router())
        .merge(handlers::singer_router())
        .route("/api/venues/:venue_id/ws", get(handlers::websocket::handle))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness))
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
