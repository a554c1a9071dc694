use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::sync::watch;

use legiswatch::config::Config;
use legiswatch::pipeline::{RunOutcome, Trigger, TriggerKind};

use super::{build_orchestrator, lock_store};

/// Run a single trigger now and print the result as JSON
pub async fn tick(config: Config, kind: TriggerKind) -> Result<()> {
    let _lock = lock_store(&config)?;
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = build_orchestrator(&config, shutdown_rx)?;

    let reports = orchestrator.submit(Trigger::new(kind, Utc::now())).await;
    let mut failed = None;

    for report in &reports {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        println!("{json}");

        if let RunOutcome::Failed { error, .. } = &report.outcome {
            failed = Some(error.clone());
        }
    }

    if let Some(error) = failed {
        bail!("{kind} run failed: {error}");
    }
    Ok(())
}
