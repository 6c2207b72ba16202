//! TOML configuration file loading
//!
//! Supports `~/.config/livetalk/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LivetalkConfigFile {
    /// Segmentation engine configuration
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Conversation controller configuration
    #[serde(default)]
    pub conversation: ConversationFileConfig,
}

/// Voice activity detection and segmentation configuration
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    /// Classifier method ("energy", "model-based", "frame-classifier")
    pub method: Option<String>,

    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Samples per chunk
    pub chunk_size: Option<usize>,

    /// Detection threshold (0.0 to 1.0)
    pub threshold: Option<f32>,

    /// Seconds of speech before a start is confirmed
    pub min_speech_duration: Option<f64>,

    /// Seconds of silence before an end is confirmed
    pub min_silence_duration: Option<f64>,

    /// Seconds of user speech during playback before barge-in fires
    pub interruption_threshold: Option<f64>,

    /// Seconds of audio retained ahead of a confirmed onset
    pub pre_roll_seconds: Option<f64>,

    /// Sub-frame length for the frame classifier (10, 20 or 30 ms)
    pub frame_duration_ms: Option<u32>,

    /// Chunks buffered between capture and processing
    pub queue_capacity: Option<usize>,
}

/// Conversation controller configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Turns kept in the rolling history window
    pub max_history: Option<usize>,

    /// System prompt sent ahead of the history
    pub system_prompt: Option<String>,

    /// Greeting spoken when the controller starts (empty string disables it)
    pub welcome_message: Option<String>,

    /// Allow the user to barge in on playback
    pub enable_interruption: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LivetalkConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LivetalkConfigFile {
    config_file_path().map_or_else(LivetalkConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_config_file_from(path: &Path) -> LivetalkConfigFile {
    if !path.exists() {
        return LivetalkConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LivetalkConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LivetalkConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/livetalk/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("livetalk").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file_from(&dir.path().join("absent.toml"));
        assert!(fc.vad.method.is_none());
        assert!(fc.conversation.max_history.is_none());
    }

    #[test]
    fn test_partial_file_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[vad]\nmethod = \"frame-classifier\"\nthreshold = 0.7\n\n[conversation]\nmax_history = 4\n",
        )
        .unwrap();

        let fc = load_config_file_from(&path);
        assert_eq!(fc.vad.method.as_deref(), Some("frame-classifier"));
        assert_eq!(fc.vad.threshold, Some(0.7));
        assert!(fc.vad.sample_rate.is_none());
        assert_eq!(fc.conversation.max_history, Some(4));
    }

    #[test]
    fn test_unparsable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[vad\nmethod = ").unwrap();

        let fc = load_config_file_from(&path);
        assert!(fc.vad.method.is_none());
    }
}
