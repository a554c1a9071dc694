//! In-memory state store with failure injection

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{PipelineSnapshot, StateStore, StorageError};

/// State store that keeps the committed snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<PipelineSnapshot>,
    fail_next_commit: AtomicBool,
    fail_loads: AtomicBool,
    fail_next_load: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already committed snapshot
    pub fn with_snapshot(snapshot: PipelineSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Make the next commit fail without touching the stored snapshot
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next load fail
    pub fn fail_next_load(&self) {
        self.fail_next_load.store(true, Ordering::SeqCst);
    }

    /// Make every load fail until reset
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Copy of the last committed snapshot
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStore for MemoryStateStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<PipelineSnapshot, StorageError> {
        if self.fail_next_load.swap(false, Ordering::SeqCst) || self.fail_loads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected load failure".to_string()));
        }
        Ok(self.snapshot())
    }

    fn commit(&self, snapshot: &PipelineSnapshot) -> Result<(), StorageError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected commit failure".to_string()));
        }

        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
