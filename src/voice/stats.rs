//! Engine diagnostics counters

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    chunks_processed: AtomicU64,
    chunks_dropped: AtomicU64,
    utterances: AtomicU64,
    interruptions: AtomicU64,
    classifier_downgrades: AtomicU64,
}

/// Shared diagnostics handle, created with the engine and cloned into its workers
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    inner: Arc<Counters>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Chunks run through the pipeline
    pub chunks_processed: u64,
    /// Chunks evicted from a full queue
    pub chunks_dropped: u64,
    /// Utterances emitted
    pub utterances: u64,
    /// Barge-ins detected
    pub interruptions: u64,
    /// Classifier fallbacks to energy, at startup or after a backend failure
    pub classifier_downgrades: u64,
}

impl EngineStats {
    /// Create a zeroed handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_processed(&self) {
        self.inner.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new drop total
    pub(crate) fn record_dropped(&self) -> u64 {
        self.inner.chunks_dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_utterance(&self) {
        self.inner.utterances.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_interruption(&self) {
        self.inner.interruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_downgrade(&self) {
        self.inner.classifier_downgrades.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_processed: self.inner.chunks_processed.load(Ordering::Relaxed),
            chunks_dropped: self.inner.chunks_dropped.load(Ordering::Relaxed),
            utterances: self.inner.utterances.load(Ordering::Relaxed),
            interruptions: self.inner.interruptions.load(Ordering::Relaxed),
            classifier_downgrades: self.inner.classifier_downgrades.load(Ordering::Relaxed),
        }
    }
}
