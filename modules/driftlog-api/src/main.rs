use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use driftlog_api::{serve, AppState};
use driftlog_common::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("driftlog=info".parse()?))
        .init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let state = Arc::new(AppState::new(config.data_dir.clone()));

    let addr = config.bind_addr();
    info!(data_dir = %config.data_dir.display(), "driftlog API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve(listener, state).await?;

    Ok(())
}
