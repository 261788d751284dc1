//! Bot runtime: polling, periodic snapshots and shutdown flush.

use std::time::Duration;

use teloxide::dispatching::DefaultKey;
use teloxide::prelude::*;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::dispatcher::ThrottledBot;
use crate::config::Config;
use crate::store::Stores;

/// Run until shutdown, then flush every store.
///
/// Without a dispatcher the process only serves the stores and waits for Ctrl-C.
pub async fn run(
    config: &Config,
    stores: Stores,
    dispatcher: Option<Dispatcher<ThrottledBot, anyhow::Error, DefaultKey>>,
) {
    let snapshots = config
        .snapshot_interval
        .map(|period| spawn_snapshots(stores.clone(), period));

    match dispatcher {
        Some(mut dispatcher) => {
            info!("Starting bot in polling mode...");
            dispatcher.dispatch().await;
        }
        None => {
            info!("Running headless, press Ctrl-C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }

    if let Some(task) = snapshots {
        task.abort();
    }

    info!("Shutting down, flushing settings stores...");
    match stores.persist_all().await {
        Ok(()) => info!("Settings stores flushed"),
        Err(e) => error!("Final flush failed: {}", e),
    }
}

/// Flush every store every `period`. The first flush happens one period in.
fn spawn_snapshots(stores: Stores, period: Duration) -> JoinHandle<()> {
    info!("Snapshotting settings every {}s", period.as_secs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = stores.persist_all().await {
                warn!("Periodic snapshot incomplete: {}", e);
            }
        }
    })
}
