use anyhow::{Context, Result};

use legiswatch::config::Config;

use super::{build_dispatcher, outbox};

/// Retry every report waiting in the outbox
pub async fn resend(config: Config) -> Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    let outbox = outbox(&config);

    let summary = outbox
        .resend(dispatcher.as_ref())
        .await
        .with_context(|| format!("Failed to resend from {}", outbox.dir().display()))?;

    println!(
        "Resent {} report(s) via {}, {} still pending",
        summary.delivered,
        dispatcher.name(),
        summary.failed
    );
    Ok(())
}
