use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use echo_api::assistant::ensure_assistant_identity;
use echo_api::config::Config;
use echo_api::db::identities::{IdentityStore, MemoryIdentityStore};
use echo_api::db::messages::{MemoryMessageStore, MessageStore};
use echo_api::gateway::sweep::BackgroundTasks;
use echo_api::AppState;

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

    let identities: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let messages: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());

    match ensure_assistant_identity(identities.as_ref()).await {
        Ok(finn) => tracing::info!(user_id = %finn.id, "assistant identity ready"),
        Err(e) => tracing::error!(error = %e, "failed to bootstrap assistant identity"),
    }

    let state = AppState::new(config, identities, messages);
    let tasks = BackgroundTasks::start(Arc::clone(&state.gateway), &state.config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(echo_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "echo-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tasks.shutdown();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
