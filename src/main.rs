use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use clap::Parser;
use gitkeeper::{handle_trigger, Config, Manager, TriggerRequest, TriggerResponse};
use log::{error, info};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

/// Keeps local git working copies in sync with their remotes.
#[derive(Parser)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long, default_value = "gitkeeper.toml")]
    config: String,
    /// Address the update trigger endpoint listens on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

async fn update_repo(
    State(manager): State<Arc<Manager>>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> TriggerResponse {
    handle_trigger(&manager, &name, TriggerRequest { method, headers, body }).await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    let config = Config::load_config(&args.config)?;
    info!("Provisioning {} repositories from {}", config.repos.len(), args.config);
    let manager = Arc::new(Manager::provision(&config).await?);
    manager.start();

    let app = Router::new()
        .route("/update/{name}", any(update_repo))
        .with_state(Arc::clone(&manager));

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!("Listening for update triggers on {}", args.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.stop();
    Ok(())
}
