use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

use legiswatch::config::Config;
use legiswatch::metrics;
use legiswatch::scheduler::{ScheduleTrigger, TickSchedule};

use super::{build_orchestrator, lock_store};

/// Run the daemon until Ctrl-C
pub async fn run(config: Config) -> Result<()> {
    let lock = lock_store(&config)?;
    tracing::info!(lock = %lock.path().display(), "State store claimed");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    let metrics_server = config.metrics.listen_addr.map(|addr| {
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = metrics::server::serve(addr, shutdown).await {
                tracing::error!(error = %e, "Metrics server failed");
            }
        })
    });

    let schedule = TickSchedule::from_config(&config.schedule).context("Invalid schedule")?;
    let orchestrator = Arc::new(build_orchestrator(&config, shutdown_rx.clone())?);

    tracing::info!(
        fetch_interval_minutes = config.schedule.fetch_interval_minutes,
        daily_report_time = %config.schedule.daily_report_time,
        weekly_report_day = %config.schedule.weekly_report_day,
        "Daemon started"
    );

    let ticks = ScheduleTrigger::new(schedule, orchestrator)
        .run(shutdown_rx)
        .await;

    if let Some(handle) = metrics_server {
        let _ = handle.await;
    }

    tracing::info!(ticks = ticks, "Daemon stopped");
    Ok(())
}
