//! Spoken dialogue loop
//!
//! The conversation controller consumes [`EngineEvent`](crate::voice::EngineEvent)s
//! and drives the external speech backends through narrow capability traits.
//! Concrete recognizers, chat models and synthesizers live outside this crate.

mod controller;
mod conversation;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use controller::{ControllerReport, ConversationController, ControllerBuilder};
pub use conversation::Conversation;

use crate::voice::{AudioPlayback, PlaybackOutcome, SynthesizedAudio};
use crate::{Error, Result};

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the chat model
    System,
    /// Transcribed user speech
    User,
    /// Model reply
    Assistant,
}

/// One message in the conversation window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a message
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Speech-to-text backend
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe 16-bit little-endian mono PCM
    ///
    /// # Errors
    ///
    /// Returns error if recognition fails
    async fn transcribe(&self, pcm: &[u8], sample_rate: u32) -> Result<String>;
}

/// Reply generator
#[async_trait]
pub trait Chat: Send + Sync {
    /// Produce the assistant reply for the conversation so far
    ///
    /// # Errors
    ///
    /// Returns error if generation fails
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Text-to-speech backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into playable audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;
}

/// Audio output the controller plays replies through
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Get ready for the next reply; called before `system_speaking` is raised
    fn prepare(&self) {}

    /// Play audio until it completes or is aborted
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    async fn play(&self, audio: SynthesizedAudio) -> Result<PlaybackOutcome>;
}

/// [`AudioSink`] over the speaker driver, run on the blocking pool
#[derive(Clone)]
pub struct SpeakerSink {
    playback: Arc<AudioPlayback>,
}

impl SpeakerSink {
    /// Wrap a playback driver
    #[must_use]
    pub const fn new(playback: Arc<AudioPlayback>) -> Self {
        Self { playback }
    }
}

#[async_trait]
impl AudioSink for SpeakerSink {
    fn prepare(&self) {
        self.playback.abort_handle().reset();
    }

    async fn play(&self, audio: SynthesizedAudio) -> Result<PlaybackOutcome> {
        let playback = Arc::clone(&self.playback);
        tokio::task::spawn_blocking(move || playback.play(audio))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }
}
