mod batcher;
mod checks;
mod config;
mod diff;
mod librus;
mod logger;
mod models;
mod scheduler;
mod snapshot;
#[cfg(test)]
mod testing;
mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;

use crate::batcher::Batcher;
use crate::checks::Checker;
use crate::config::Config;
use crate::librus::LibrusClient;
use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotStore;
use crate::webhook::DiscordWebhook;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    logger::init_logging(config.debug, config.environment);

    tracing::info!(
        environment = ?config.environment,
        poll_interval_secs = config.poll_interval.as_secs(),
        lucky_number_index = ?config.student_index,
        "Starting Librus watcher"
    );

    let portal = LibrusClient::new().context("Failed to build Librus client")?;
    let sink = DiscordWebhook::new(config.webhook_url.clone());
    let checker = Arc::new(Checker::new(
        Arc::new(portal),
        Batcher::new(Arc::new(sink)),
        SnapshotStore::new(Local::now().date_naive()),
        config.student_index,
    ));

    let scheduler = Scheduler::new(checker, config.poll_interval);
    scheduler.prime(&config.login, &config.password).await?;

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
