//! Synchronous per-chunk segmentation core
//!
//! Classifies each chunk, drives the hysteresis tracker, keeps the pre-roll
//! buffer and assembles utterances. While the system is speaking the chunk
//! goes to the interruption monitor instead and nothing is buffered.

use super::{
    AudioChunk, Classifier, HysteresisTracker, InterruptionMonitor, PreRollBuffer, StreamClock,
    Utterance, UtteranceAssembler, VadMethod,
};
use crate::config::VadConfig;

/// Events crossing from the engine to the conversation controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A speech onset was confirmed
    SpeechStarted,
    /// The end of speech was confirmed
    SpeechEnded,
    /// The user barged in on playback
    Interrupted,
    /// A complete utterance is ready for recognition
    UtteranceReady(Utterance),
}

/// The segmentation state for one audio stream
pub struct VoicePipeline {
    classifier: Box<dyn Classifier>,
    clock: StreamClock,
    tracker: HysteresisTracker,
    monitor: InterruptionMonitor,
    pre_roll: PreRollBuffer,
    assembler: UtteranceAssembler,
    interruption_enabled: bool,
    system_speaking: bool,
}

impl VoicePipeline {
    /// Create a pipeline for the given configuration and classifier
    #[must_use]
    pub fn new(config: &VadConfig, classifier: Box<dyn Classifier>) -> Self {
        Self {
            classifier,
            clock: StreamClock::new(config.sample_rate),
            tracker: HysteresisTracker::new(config.min_speech_duration, config.min_silence_duration),
            monitor: InterruptionMonitor::new(config.interruption_threshold),
            pre_roll: PreRollBuffer::new(config.pre_roll_capacity()),
            assembler: UtteranceAssembler::new(),
            interruption_enabled: true,
            system_speaking: false,
        }
    }

    /// Enable or disable barge-in detection
    #[must_use]
    pub const fn with_interruption(mut self, enabled: bool) -> Self {
        self.interruption_enabled = enabled;
        self
    }

    /// Process one chunk in arrival order
    ///
    /// `system_speaking` is the playback flag sampled for this chunk.
    pub fn process(&mut self, chunk: AudioChunk, system_speaking: bool) -> Vec<EngineEvent> {
        let chunk = self.clock.stamp(chunk);

        if system_speaking {
            return self.process_during_playback(&chunk);
        }

        if self.system_speaking {
            self.system_speaking = false;
            self.monitor.disarm();
        }

        let decision = self.classifier.classify(&chunk);
        tracing::trace!(
            is_speech = decision.is_speech,
            method = %decision.method,
            at = ?chunk.span().end,
            "chunk classified"
        );

        let update = self.tracker.update(decision.is_speech, chunk.span());
        let mut events = Vec::new();

        if update.speech_started {
            tracing::debug!(pre_roll = self.pre_roll.len(), "speech started, splicing pre-roll");
            self.assembler.begin(&mut self.pre_roll);
            self.assembler.push(chunk);
            events.push(EngineEvent::SpeechStarted);
        } else if update.is_speaking {
            self.assembler.push(chunk);
        } else if update.speech_ended {
            events.push(EngineEvent::SpeechEnded);
            if let Some(utterance) = self.assembler.finish() {
                tracing::info!(
                    duration_ms = utterance.duration().as_millis(),
                    bytes = utterance.pcm.len(),
                    chunks = utterance.chunks,
                    method = %decision.method,
                    "utterance complete"
                );
                events.push(EngineEvent::UtteranceReady(utterance));
            }
            self.pre_roll.clear();
        } else {
            self.pre_roll.push(chunk);
        }

        events
    }

    fn process_during_playback(&mut self, chunk: &AudioChunk) -> Vec<EngineEvent> {
        if !self.system_speaking {
            self.system_speaking = true;
            if self.tracker.is_speaking() || !self.assembler.is_empty() {
                tracing::debug!("system started speaking, discarding segment in progress");
            }
            self.clear_segment();
        }

        if !self.interruption_enabled {
            return Vec::new();
        }

        let decision = self.classifier.classify(chunk);
        if self.monitor.update(decision.is_speech, chunk.span()) {
            tracing::info!(at = ?chunk.span().end, method = %decision.method, "user interrupted playback");
            self.clear_segment();
            return vec![EngineEvent::Interrupted];
        }

        Vec::new()
    }

    fn clear_segment(&mut self) {
        self.tracker.reset();
        self.pre_roll.clear();
        self.assembler.clear();
    }

    /// Discard buffered audio and return every detector to its idle state
    pub fn reset(&mut self) {
        self.clear_segment();
        self.monitor.disarm();
        tracing::debug!("pipeline reset");
    }

    /// Classifier strategy currently in effect
    #[must_use]
    pub fn method(&self) -> VadMethod {
        self.classifier.method()
    }

    /// Whether a start has been confirmed and not yet ended
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.tracker.is_speaking()
    }

    /// Chunks held in the pre-roll buffer
    #[must_use]
    pub fn pre_roll_len(&self) -> usize {
        self.pre_roll.len()
    }

    /// Chunks held in the utterance in progress
    #[must_use]
    pub fn utterance_len(&self) -> usize {
        self.assembler.len()
    }

    /// Whether the interruption monitor is timing a run
    #[must_use]
    pub const fn interruption_pending(&self) -> bool {
        self.monitor.is_pending()
    }
}
