use anyhow::{Context, Result};

use legiswatch::config::Config;
use legiswatch::storage::open_store;

use super::outbox;

/// Print a summary of the committed state
pub async fn status(config: Config) -> Result<()> {
    let store = open_store(config.storage.backend, &config.storage.path)
        .with_context(|| format!("Failed to open state store {}", config.storage.path.display()))?;
    let snapshot = store.load().context("Failed to load state")?;

    println!("legiswatch status");
    println!("{:-<40}", "");
    println!("State store: {} ({})", store.name(), config.storage.path.display());
    println!("Seen documents: {}", snapshot.seen.len());

    match (snapshot.series.first_date(), snapshot.series.last_date()) {
        (Some(first), Some(last)) => {
            println!("Series: {first} .. {last} ({} days)", snapshot.series.len())
        }
        _ => println!("Series: empty"),
    }

    match snapshot.last_fetch_at {
        Some(at) => println!("Last fetch: {}", at.to_rfc3339()),
        None => println!("Last fetch: never"),
    }

    let pending = outbox(&config).pending().context("Failed to read outbox")?;
    println!("Outbox: {} undelivered report(s)", pending.len());
    for (_, entry) in pending.iter().take(10) {
        println!(
            "  {} failed at {} after {} attempt(s)",
            entry.report.id,
            entry.failed_at.to_rfc3339(),
            entry.attempts
        );
    }

    Ok(())
}
