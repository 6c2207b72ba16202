//! Livetalk - real-time spoken dialogue engine
//!
//! This library provides the core of a hands-free voice conversation loop:
//! - Speech segmentation of a live microphone stream with pre-roll
//! - Barge-in detection while synthesized audio is playing
//! - A conversation controller over pluggable recognition, chat and synthesis backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Capture (cpal realtime callback)           │
//! └────────────────────┬────────────────────────────────┘
//!                      │ bounded queue, drop-oldest
//! ┌────────────────────▼────────────────────────────────┐
//! │              Segmentation Engine                    │
//! │  Classifier │ Hysteresis │ Pre-roll │ Barge-in      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ EngineEvent channel
//! ┌────────────────────▼────────────────────────────────┐
//! │           Conversation Controller                   │
//! │   Recognizer  │  Chat  │  Synthesizer  │  Playback  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dialogue;
pub mod error;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use voice::{EngineEvent, SegmentationEngine, Utterance, VoicePipeline};
