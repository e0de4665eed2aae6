//! Plays one ball session against a lab API server and prints the reconciliation report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use driftlog_client::LabClient;
use driftlog_common::Config;
use driftlog_session::{user_id, Controls, FileStore, Session, SessionConfig, SystemClock};

/// Give up on the ball after this long and stop it by hand.
const MAX_RUN: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("driftlog=info".parse()?))
        .init();

    let config = Config::from_env()?;
    let store = Arc::new(FileStore::new(config.state_dir.clone()));
    let user = user_id(store.as_ref())?;
    let api = Arc::new(LabClient::new(&config.api_base, &user)?);

    info!(api = %config.api_base, user = %user, "Starting session");

    let session = Session::new(
        api,
        store,
        Arc::new(SystemClock),
        user,
        SessionConfig::from_config(&config),
    );

    let initial = session.refresh().await;
    info!(summary = %initial.summary, "Server state before the run");

    session.open().await?;
    session.start().await?;

    let deadline = tokio::time::Instant::now() + MAX_RUN;
    while session.controls().await != Controls::Reload {
        if tokio::time::Instant::now() >= deadline {
            warn!("Ball still in play, stopping it");
            session.stop().await?;
            break;
        }
        if !session.is_running().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let settled = session.logger().settle().await;
    info!(
        delivered = settled.delivered,
        failed = settled.failed,
        "Stream sends settled"
    );

    let view = session.close().await?;
    println!("{view}");

    Ok(())
}
