//! Error types for livetalk

use thiserror::Error;

/// Result type alias for livetalk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the dialogue loop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech classifier backend error
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Playback driver error
    #[error("playback error: {0}")]
    Playback(String),

    /// Speech recognition error
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Chat backend error
    #[error("chat error: {0}")]
    Chat(String),

    /// Speech synthesis error
    #[error("synthesizer error: {0}")]
    Synthesizer(String),

    /// Segmentation engine lifecycle error
    #[error("engine error: {0}")]
    Engine(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
