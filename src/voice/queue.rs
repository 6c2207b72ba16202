//! Bounded chunk queue between the capture callback and the processing thread
//!
//! The producer side never blocks. When the queue is full the oldest queued
//! chunk is evicted to make room, so the processing thread always works on
//! the freshest audio.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::{AudioChunk, EngineStats};

/// Attempts to make room before the incoming chunk itself is dropped
const MAX_EVICTIONS_PER_PUSH: usize = 4;

/// Log every Nth dropped chunk after the first
const DROP_LOG_INTERVAL: u64 = 100;

/// What happened to a pushed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued without loss
    Queued,
    /// Queued after evicting older chunks
    QueuedAfterEviction,
    /// Not queued; the queue stayed full
    Dropped,
}

/// Producer handle, cheap to clone into a capture callback
#[derive(Clone)]
pub struct ChunkSender {
    tx: Sender<AudioChunk>,
    evict: Receiver<AudioChunk>,
    stats: EngineStats,
}

/// Consumer handle owned by the processing thread
pub struct ChunkReceiver {
    rx: Receiver<AudioChunk>,
}

/// Create a bounded queue holding at most `capacity` chunks
#[must_use]
pub fn chunk_queue(capacity: usize, stats: EngineStats) -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        ChunkSender {
            tx,
            evict: rx.clone(),
            stats,
        },
        ChunkReceiver { rx },
    )
}

impl ChunkSender {
    /// Enqueue a chunk without blocking, evicting the oldest when full
    pub fn push(&self, chunk: AudioChunk) -> PushOutcome {
        let mut chunk = chunk;
        let mut evicted = false;

        for _ in 0..=MAX_EVICTIONS_PER_PUSH {
            match self.tx.try_send(chunk) {
                Ok(()) => {
                    return if evicted {
                        PushOutcome::QueuedAfterEviction
                    } else {
                        PushOutcome::Queued
                    };
                }
                Err(TrySendError::Full(returned)) => {
                    chunk = returned;
                    if self.evict.try_recv().is_ok() {
                        evicted = true;
                        self.note_drop();
                    }
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        self.note_drop();
        PushOutcome::Dropped
    }

    /// Chunks waiting to be processed
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// True when nothing is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    fn note_drop(&self) {
        let total = self.stats.record_dropped();
        if total == 1 || total % DROP_LOG_INTERVAL == 0 {
            tracing::warn!(dropped = total, "chunk queue full, dropping oldest audio");
        }
    }
}

impl ChunkReceiver {
    /// Wait up to `timeout` for the next chunk
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AudioChunk> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Discard every queued chunk, returning how many were discarded
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }
}
