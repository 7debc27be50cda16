use std::net::SocketAddr;
use std::path::Path;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use room_api::config::Config;
use room_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    tracing::info!(
        client_url = %config.client_url,
        room_idle_timeout_secs = config.room_idle_timeout_secs,
        "room-api configured"
    );

    let cors = match config.client_url.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new().allow_origin(origin),
        Err(_) => {
            tracing::warn!(client_url = %config.client_url, "invalid CLIENT_URL, allowing any origin");
            CorsLayer::new().allow_origin(Any)
        }
    }
    .allow_methods([Method::GET, Method::POST])
    .allow_headers(Any);

    let state = AppState::new(config);
    let reaper = state.reaper.clone();

    let app = Router::new()
        .merge(room_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "room-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let cancelled = reaper.cancel_all();
    tracing::info!(cancelled, "room-api stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
