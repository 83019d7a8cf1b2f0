//! HTTP query surface: an Axum server over the read-side queries and the
//! publication channel.
//!
//! CORS enabled for browser clients.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Bind `port` and serve the API in a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server stopped");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/arbitrage/top", get(routes::get_top))
        .route("/api/arbitrage/filtered", get(routes::get_filtered))
        .route("/api/arbitrage/manual-simulate", get(routes::get_manual_simulate))
        .route("/api/arbitrage/stream", get(routes::get_stream))
        .route("/api/market/weekly", get(routes::get_weekly))
        .route("/api/market/history", get(routes::get_history))
        .route("/api/market/items", get(routes::get_items))
        .route("/api/market/cities", get(routes::get_cities))
        .route("/api/market/prices", get(routes::get_prices))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
