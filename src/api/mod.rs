//! Control/status façade — Axum web server.
//!
//! Exposes the bot registry over REST: list instruments, create and
//! manage bots, read status/recovery snapshots, and update risk limits
//! between cycles. CORS enabled for local dashboards.

pub mod routes;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::AppState;

/// Start the API server. Spawns a background task — doesn't block.
pub fn spawn_server(state: AppState, port: u16) {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "API server starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind API port");

        axum::serve(listener, app).await.expect("API server error");
    });
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/instruments", get(routes::get_instruments))
        .route("/api/bots", get(routes::list_bots))
        .route("/api/bots", post(routes::create_bot))
        .route("/api/bots/:id/start", post(routes::start_bot))
        .route("/api/bots/:id/stop", post(routes::stop_bot))
        .route("/api/bots/:id", delete(routes::delete_bot))
        .route("/api/bots/:id/status", get(routes::get_status))
        .route("/api/bots/:id/recovery", get(routes::get_recovery))
        .route("/api/bots/:id/limits", put(routes::update_limits))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
