//! Threaded segmentation engine
//!
//! One dedicated thread drains the chunk queue and runs the [`VoicePipeline`]
//! chunk by chunk in arrival order. Events go out on an unbounded channel
//! that the conversation controller drains; playback is aborted
//! synchronously, on the processing thread, when the user barges in.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;

use super::queue::{ChunkReceiver, ChunkSender, chunk_queue};
use super::{Classifier, EngineEvent, EngineStats, VoicePipeline};
use crate::config::VadConfig;
use crate::{Error, Result};

/// How long the processing thread waits for a chunk before re-checking its flags
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receiving end of the engine's event stream
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Hard-stop hook into the playback driver
pub trait PlaybackControl: Send + Sync {
    /// Stop whatever is playing right now
    ///
    /// # Errors
    ///
    /// Returns error if the driver could not be signalled
    fn abort(&self) -> Result<()>;
}

/// Shared "system is speaking" flag
///
/// Set by the controller right before playback and cleared right after;
/// sampled once per chunk by the processing thread.
#[derive(Debug, Clone, Default)]
pub struct SystemSpeaking(Arc<AtomicBool>);

impl SystemSpeaking {
    /// Create a cleared flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag
    pub fn set(&self, speaking: bool) {
        self.0.store(speaking, Ordering::Release);
    }

    /// Read the flag
    #[must_use]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// State shared between the engine handle and its processing thread
struct Shared {
    stop: AtomicBool,
    reset_requested: AtomicBool,
    system_speaking: SystemSpeaking,
    playback: Option<Arc<dyn PlaybackControl>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    stats: EngineStats,
}

/// Everything the processing thread owns while it runs
struct Worker {
    pipeline: VoicePipeline,
    receiver: ChunkReceiver,
}

/// Real-time speech segmentation and barge-in engine
pub struct SegmentationEngine {
    shared: Arc<Shared>,
    sender: ChunkSender,
    idle: Option<Worker>,
    thread: Option<JoinHandle<Worker>>,
}

/// Builder for [`SegmentationEngine`]
pub struct EngineBuilder {
    config: VadConfig,
    classifier: Box<dyn Classifier>,
    playback: Option<Arc<dyn PlaybackControl>>,
    system_speaking: SystemSpeaking,
    interruption: bool,
}

impl EngineBuilder {
    /// Abort this playback driver on barge-in
    #[must_use]
    pub fn playback_control(mut self, playback: Arc<dyn PlaybackControl>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Share an existing system-speaking flag
    #[must_use]
    pub fn system_speaking(mut self, flag: SystemSpeaking) -> Self {
        self.system_speaking = flag;
        self
    }

    /// Enable or disable barge-in detection
    #[must_use]
    pub const fn interruption(mut self, enabled: bool) -> Self {
        self.interruption = enabled;
        self
    }

    /// Validate the configuration and build the engine with its event stream
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn build(self) -> Result<(SegmentationEngine, EventReceiver)> {
        self.config.validate()?;

        let stats = EngineStats::new();
        let (sender, receiver) = chunk_queue(self.config.queue_capacity, stats.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let pipeline =
            VoicePipeline::new(&self.config, self.classifier).with_interruption(self.interruption);

        if pipeline.method() != self.config.method {
            tracing::warn!(
                configured = %self.config.method,
                active = %pipeline.method(),
                "classifier already downgraded at startup"
            );
            stats.record_downgrade();
        }

        tracing::debug!(
            method = %pipeline.method(),
            pre_roll_chunks = self.config.pre_roll_capacity(),
            queue_capacity = self.config.queue_capacity,
            "segmentation engine created"
        );

        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            reset_requested: AtomicBool::new(false),
            system_speaking: self.system_speaking,
            playback: self.playback,
            events: events_tx,
            stats,
        });

        let engine = SegmentationEngine {
            shared,
            sender,
            idle: Some(Worker { pipeline, receiver }),
            thread: None,
        };

        Ok((engine, events_rx))
    }
}

impl SegmentationEngine {
    /// Start building an engine
    #[must_use]
    pub fn builder(config: VadConfig, classifier: Box<dyn Classifier>) -> EngineBuilder {
        EngineBuilder {
            config,
            classifier,
            playback: None,
            system_speaking: SystemSpeaking::new(),
            interruption: true,
        }
    }

    /// Spawn the processing thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            tracing::warn!("segmentation engine already running");
            return Ok(());
        }

        let worker = self
            .idle
            .take()
            .ok_or_else(|| Error::Engine("engine worker state lost".to_string()))?;

        self.shared.stop.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);

        let handle = std::thread::Builder::new()
            .name("livetalk-vad".to_string())
            .spawn(move || run_worker(worker, &shared))
            .map_err(|e| Error::Engine(format!("failed to spawn processing thread: {e}")))?;

        self.thread = Some(handle);
        tracing::info!("segmentation engine started");
        Ok(())
    }

    /// Stop the processing thread, discarding in-flight audio
    ///
    /// No partial utterance is emitted.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        self.shared.stop.store(true, Ordering::Release);

        match handle.join() {
            Ok(mut worker) => {
                worker.pipeline.reset();
                let discarded = worker.receiver.drain();
                tracing::debug!(discarded, "discarded queued chunks on stop");
                self.idle = Some(worker);
            }
            Err(_) => {
                tracing::error!("segmentation thread panicked; engine cannot be restarted");
            }
        }

        self.shared.reset_requested.store(false, Ordering::Release);
        tracing::info!("segmentation engine stopped");
    }

    /// Clear the tracker and both buffers
    ///
    /// Applied by the processing thread before its next chunk.
    pub fn reset(&mut self) {
        if let Some(worker) = self.idle.as_mut() {
            worker.pipeline.reset();
        } else {
            self.shared.reset_requested.store(true, Ordering::Release);
        }
    }

    /// Report whether the system is currently playing audio
    pub fn set_system_speaking(&self, speaking: bool) {
        self.shared.system_speaking.set(speaking);
        tracing::debug!(speaking, "system speaking");
    }

    /// Handle to the shared system-speaking flag
    #[must_use]
    pub fn system_speaking(&self) -> SystemSpeaking {
        self.shared.system_speaking.clone()
    }

    /// Producer handle for the capture driver
    #[must_use]
    pub fn chunk_sender(&self) -> ChunkSender {
        self.sender.clone()
    }

    /// Diagnostics counters
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.shared.stats.clone()
    }

    /// Whether the processing thread is running
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for SegmentationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(worker: Worker, shared: &Shared) -> Worker {
    let Worker {
        mut pipeline,
        receiver,
    } = worker;

    tracing::debug!("processing thread started");
    let mut receiver_gone = false;

    while !shared.stop.load(Ordering::Acquire) {
        let next = receiver.recv_timeout(POLL_INTERVAL);

        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        if shared.reset_requested.swap(false, Ordering::AcqRel) {
            pipeline.reset();
        }

        let Some(chunk) = next else {
            continue;
        };

        let method_before = pipeline.method();
        let events = pipeline.process(chunk, shared.system_speaking.get());

        if pipeline.method() != method_before {
            shared.stats.record_downgrade();
        }

        for event in events {
            dispatch(shared, event, &mut receiver_gone);
        }
        shared.stats.record_processed();
    }

    tracing::debug!("processing thread stopped");
    Worker { pipeline, receiver }
}

fn dispatch(shared: &Shared, event: EngineEvent, receiver_gone: &mut bool) {
    let interrupted = event == EngineEvent::Interrupted;
    let utterance = matches!(event, EngineEvent::UtteranceReady(_));

    if interrupted {
        if let Some(playback) = &shared.playback {
            match std::panic::catch_unwind(AssertUnwindSafe(|| playback.abort())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "failed to abort playback"),
                Err(_) => tracing::error!("playback abort panicked"),
            }
        }
        shared.system_speaking.set(false);
    }

    if shared.events.send(event).is_err() && !*receiver_gone {
        *receiver_gone = true;
        tracing::warn!("event receiver dropped, engine events are being discarded");
    }

    // Counters move only after the event is observable on the channel
    if interrupted {
        shared.stats.record_interruption();
    }
    if utterance {
        shared.stats.record_utterance();
    }
}
