pub mod check_config;
pub mod resend;
pub mod run;
pub mod status;
pub mod tick;

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

use legiswatch::config::Config;
use legiswatch::ingest::HttpIngestionAdapter;
use legiswatch::notifications::{
    DeliveryService, LogDispatcher, NotificationDispatcher, Outbox, WebhookConfig,
    WebhookDispatcher,
};
use legiswatch::pipeline::{Orchestrator, PipelineComponents, PipelineSettings};
use legiswatch::storage::{open_store, WriterLock};

// Re-export command functions for convenience
pub use check_config::check_config;
pub use resend::resend;
pub use run::run;
pub use status::status;
pub use tick::tick;

/// Dispatcher for the configured channel: the webhook if set, else the log
pub(crate) fn build_dispatcher(config: &Config) -> Result<Arc<dyn NotificationDispatcher>> {
    let Some(url) = &config.notification.webhook_url else {
        return Ok(Arc::new(LogDispatcher));
    };

    let mut webhook = WebhookConfig::new(url.clone());
    if let Some(token) = &config.notification.webhook_auth_token {
        webhook = webhook.with_auth_token(token.clone());
    }
    let dispatcher = WebhookDispatcher::new(webhook).context("Failed to create webhook dispatcher")?;
    Ok(Arc::new(dispatcher))
}

pub(crate) fn outbox(config: &Config) -> Outbox {
    Outbox::new(&config.notification.outbox_dir)
}

/// Claim the state store for this process
///
/// Held by `run` for the daemon's lifetime and by `tick` for its single run.
pub(crate) fn lock_store(config: &Config) -> Result<WriterLock> {
    WriterLock::acquire(&config.storage.path).with_context(|| {
        format!(
            "Another legiswatch process is writing {}; stop it or wait for it to finish",
            config.storage.path.display()
        )
    })
}

/// Wire the configured components into an orchestrator
pub(crate) fn build_orchestrator(
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Result<Orchestrator> {
    let keywords = config
        .monitor
        .keyword_set()
        .context("Failed to load keywords")?;
    if keywords.is_empty() {
        tracing::warn!("No keywords configured, reports will be empty");
    }

    let adapter = HttpIngestionAdapter::new(config.ingestion.adapter_config())
        .context("Failed to create ingestion adapter")?;
    let store = open_store(config.storage.backend, &config.storage.path)
        .with_context(|| format!("Failed to open state store {}", config.storage.path.display()))?;

    let recipients: BTreeSet<String> = config.notification.recipients.iter().cloned().collect();
    let delivery = DeliveryService::new(
        build_dispatcher(config)?,
        recipients,
        config.notification.max_attempts,
        outbox(config),
    );

    let components = PipelineComponents {
        keywords,
        adapter: Arc::new(adapter),
        store: Arc::from(store),
        delivery,
    };
    let settings = PipelineSettings::from_config(config)?;

    Ok(Orchestrator::new(components, settings)?.with_shutdown(shutdown))
}
