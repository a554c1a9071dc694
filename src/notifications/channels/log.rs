//! Log-only channel, used when no webhook is configured

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::{ChannelResult, NotificationDispatcher};
use crate::report::Report;

/// Writes report summaries to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, report: &Report, recipients: &BTreeSet<String>) -> ChannelResult<()> {
        tracing::info!(
            report = %report.id,
            kind = %report.kind,
            recipients = recipients.len(),
            "{}",
            report.summary()
        );
        for ranking in &report.rankings {
            tracing::info!(
                report = %report.id,
                rank = ranking.rank,
                keyword = %ranking.keyword,
                occurrences = ranking.total_occurrences,
                documents = ranking.document_count,
                direction = ranking.forecast.as_ref().map(|f| f.direction.as_str()),
                "Keyword ranking"
            );
        }
        Ok(())
    }
}
