//! Outbox for reports that failed every delivery attempt
//!
//! Each undelivered report is stored as one JSON file in the outbox
//! directory until `legiswatch resend` succeeds in delivering it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::channels::{ChannelResult, DeliveryError, NotificationDispatcher};
use crate::report::Report;
use crate::utils::{sanitize_filename, write_atomic};

/// A report waiting for manual resend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub report: Report,
    pub recipients: BTreeSet<String>,
    pub failed_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: String,
}

/// Result of an outbox resend pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResendSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Directory-backed store of undelivered reports
#[derive(Debug, Clone)]
pub struct Outbox {
    dir: PathBuf,
}

impl Outbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(path: &Path, source: std::io::Error) -> DeliveryError {
        DeliveryError::Outbox {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Persist an undelivered report, returning the file it was written to
    pub fn store(
        &self,
        report: &Report,
        recipients: &BTreeSet<String>,
        attempts: u32,
        last_error: &str,
    ) -> ChannelResult<PathBuf> {
        let entry = OutboxEntry {
            id: Uuid::new_v4(),
            report: report.clone(),
            recipients: recipients.clone(),
            failed_at: Utc::now(),
            attempts,
            last_error: last_error.to_string(),
        };

        let path = self
            .dir
            .join(format!("{}-{}.json", sanitize_filename(&report.id), entry.id));
        let content = serde_json::to_vec_pretty(&entry)?;
        write_atomic(&path, &content).map_err(|e| Self::io_error(&path, e))?;

        tracing::warn!(
            report = %report.id,
            path = %path.display(),
            attempts = attempts,
            "Report moved to outbox"
        );
        Ok(path)
    }

    /// Entries waiting for resend, oldest first
    ///
    /// Files that cannot be parsed are skipped with a warning.
    pub fn pending(&self) -> ChannelResult<Vec<(PathBuf, OutboxEntry)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;
        let mut entries = Vec::new();

        for dir_entry in read_dir {
            let path = dir_entry.map_err(|e| Self::io_error(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = std::fs::read(&path).map_err(|e| Self::io_error(&path, e))?;
            match serde_json::from_slice::<OutboxEntry>(&content) {
                Ok(entry) => entries.push((path, entry)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable outbox entry");
                }
            }
        }

        entries.sort_by(|a, b| a.1.failed_at.cmp(&b.1.failed_at));
        Ok(entries)
    }

    /// Try to deliver every pending entry once, removing the delivered ones
    pub async fn resend(&self, dispatcher: &dyn NotificationDispatcher) -> ChannelResult<ResendSummary> {
        let mut summary = ResendSummary::default();

        for (path, entry) in self.pending()? {
            match dispatcher.deliver(&entry.report, &entry.recipients).await {
                Ok(()) => {
                    std::fs::remove_file(&path).map_err(|e| Self::io_error(&path, e))?;
                    tracing::info!(report = %entry.report.id, "Resent report from outbox");
                    summary.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(report = %entry.report.id, error = %e, "Resend failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::LogDispatcher;
    use crate::report::{ReportKind, ReportWindow};
    use chrono::NaiveDate;

    fn report(id: &str) -> Report {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        Report {
            id: id.to_string(),
            kind: ReportKind::Daily,
            window: ReportWindow::day(date),
            generated_at: Utc::now(),
            rankings: Vec::new(),
            truncated: 0,
            highlights: Vec::new(),
            insufficient_data: Vec::new(),
        }
    }

    #[test]
    fn test_missing_dir_has_no_pending() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path().join("outbox"));
        assert!(outbox.pending().unwrap().is_empty());
    }

    #[test]
    fn test_store_and_pending() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path().join("outbox"));
        let recipients: BTreeSet<String> = ["ops@example.eu".to_string()].into();

        let path = outbox
            .store(&report("daily-2024-03-01"), &recipients, 3, "HTTP 503")
            .unwrap();
        std::fs::write(dir.path().join("outbox").join("garbage.json"), "{").unwrap();

        let pending = outbox.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, path);
        assert_eq!(pending[0].1.report.id, "daily-2024-03-01");
        assert_eq!(pending[0].1.attempts, 3);
        assert_eq!(pending[0].1.recipients, recipients);
    }

    #[tokio::test]
    async fn test_resend_removes_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path());
        outbox
            .store(&report("weekly-a"), &BTreeSet::new(), 3, "timeout")
            .unwrap();

        let summary = outbox.resend(&LogDispatcher).await.unwrap();
        assert_eq!(summary, ResendSummary { delivered: 1, failed: 0 });
        assert!(outbox.pending().unwrap().is_empty());
    }
}
