//! Voice processing module
//!
//! Turns a live microphone stream into discrete utterances and detects
//! when the user talks over the assistant. Capture pushes fixed-size chunks
//! into a bounded queue; a single processing thread classifies each chunk,
//! runs hysteresis and pre-roll, and emits [`EngineEvent`]s.

mod capture;
mod chunk;
mod classifier;
mod engine;
mod interruption;
mod pipeline;
mod playback;
mod queue;
mod segmenter;
mod stats;
mod tracker;
mod wav;

pub use capture::AudioCapture;
pub use chunk::{AudioChunk, ChunkSpan, StreamClock, f32_to_i16};
pub use classifier::{
    Classifier, ClassifierBackends, ClassifierDecision, ENERGY_SCALE, EnergyClassifier,
    FrameClassifier, FrameVad, ModelClassifier, SpeechModel, VadMethod, build_classifier, rms,
};
pub use engine::{
    EngineBuilder, EventReceiver, PlaybackControl, SegmentationEngine, SystemSpeaking,
};
pub use interruption::InterruptionMonitor;
pub use pipeline::{EngineEvent, VoicePipeline};
pub use playback::{AudioPlayback, PlaybackAbort, PlaybackOutcome, SynthesizedAudio};
pub use queue::{ChunkReceiver, ChunkSender, PushOutcome, chunk_queue};
pub use segmenter::{PreRollBuffer, Utterance, UtteranceAssembler};
pub use stats::{EngineStats, StatsSnapshot};
pub use tracker::{HysteresisTracker, SpeechState, TrackerUpdate};
pub use wav::{decode_wav, pcm_to_wav, read_wav, resample, samples_to_wav};
