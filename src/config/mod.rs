//! Configuration management for livetalk

pub mod file;

use std::time::Duration;

use crate::voice::VadMethod;
use crate::{Error, Result};

use file::LivetalkConfigFile;

/// Default greeting spoken when the controller starts
const DEFAULT_WELCOME_MESSAGE: &str = "Hi, I'm your assistant. What can I help you with?";

/// Default system prompt for the chat backend
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a friendly AI assistant. Answer in short, natural spoken sentences.";

/// Longest pre-roll the engine will buffer
pub const MAX_PRE_ROLL: Duration = Duration::from_secs(60);

/// Largest capture queue the engine will allocate
pub const MAX_QUEUE_CAPACITY: usize = 4096;

/// livetalk configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Segmentation engine configuration
    pub vad: VadConfig,

    /// Conversation controller configuration
    pub conversation: ConversationConfig,
}

/// Segmentation engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct VadConfig {
    /// Speech classifier strategy
    pub method: VadMethod,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples per chunk
    pub chunk_size: usize,

    /// Detection threshold (0.0 to 1.0)
    pub threshold: f32,

    /// Speech needed before a start is confirmed
    pub min_speech_duration: Duration,

    /// Silence needed before an end is confirmed
    pub min_silence_duration: Duration,

    /// Continuous user speech during playback that counts as barge-in
    pub interruption_threshold: Duration,

    /// Audio retained ahead of a confirmed onset
    pub pre_roll: Duration,

    /// Sub-frame length for the frame classifier (10, 20 or 30 ms)
    pub frame_duration_ms: u32,

    /// Chunks buffered between capture and processing before dropping the oldest
    pub queue_capacity: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            method: VadMethod::Energy,
            sample_rate: 16_000,
            chunk_size: 1024,
            threshold: 0.5,
            min_speech_duration: Duration::from_millis(250),
            min_silence_duration: Duration::from_millis(500),
            interruption_threshold: Duration::from_millis(300),
            pre_roll: Duration::from_secs(1),
            frame_duration_ms: 30,
            queue_capacity: 64,
        }
    }
}

impl VadConfig {
    /// Duration of one chunk on the audio timeline
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn chunk_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.chunk_size as f64 / f64::from(self.sample_rate))
    }

    /// Number of chunks the pre-roll buffer retains
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn pre_roll_capacity(&self) -> usize {
        if self.chunk_size == 0 {
            return 1;
        }
        let chunks =
            (self.pre_roll.as_secs_f64() * f64::from(self.sample_rate) / self.chunk_size as f64).ceil();
        (chunks as usize).max(1)
    }

    /// Check that every knob is in range
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("vad.sample_rate must be positive".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("vad.chunk_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "vad.threshold must be within 0.0..=1.0, got {}",
                self.threshold
            )));
        }
        if !matches!(self.frame_duration_ms, 10 | 20 | 30) {
            return Err(Error::Config(format!(
                "vad.frame_duration_ms must be 10, 20 or 30, got {}",
                self.frame_duration_ms
            )));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(Error::Config(format!(
                "vad.queue_capacity must be within 1..={MAX_QUEUE_CAPACITY}, got {}",
                self.queue_capacity
            )));
        }
        if self.pre_roll > MAX_PRE_ROLL {
            return Err(Error::Config(format!(
                "vad.pre_roll_seconds must be at most {}, got {}",
                MAX_PRE_ROLL.as_secs(),
                self.pre_roll.as_secs_f64()
            )));
        }
        Ok(())
    }
}

/// Conversation controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    /// Turns kept in the rolling history window
    pub max_history: usize,

    /// System prompt sent ahead of the history
    pub system_prompt: Option<String>,

    /// Greeting spoken when the controller starts
    pub welcome_message: Option<String>,

    /// Allow the user to barge in on playback
    pub enable_interruption: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            welcome_message: Some(DEFAULT_WELCOME_MESSAGE.to_string()),
            enable_interruption: true,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or the VAD method is unknown
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Parse configuration from TOML text, ignoring the environment
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or a value is invalid
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let fc: LivetalkConfigFile = toml::from_str(content)?;
        Self::resolve(fc, |_| None)
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or the VAD method is unknown
    pub fn resolve<F>(fc: LivetalkConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = VadConfig::default();

        let method = match env("LIVETALK_VAD_METHOD").or(fc.vad.method) {
            Some(raw) => raw.parse::<VadMethod>()?,
            None => defaults.method,
        };

        let seconds = |key: &str, file_value: Option<f64>, default: Duration| -> Result<Duration> {
            match parse_env(&env, key).or(file_value) {
                Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
                    Error::Config(format!("{key} must be a finite, non-negative number of seconds"))
                }),
                None => Ok(default),
            }
        };

        let vad = VadConfig {
            method,
            sample_rate: parse_env(&env, "LIVETALK_SAMPLE_RATE")
                .or(fc.vad.sample_rate)
                .unwrap_or(defaults.sample_rate),
            chunk_size: parse_env(&env, "LIVETALK_CHUNK_SIZE")
                .or(fc.vad.chunk_size)
                .unwrap_or(defaults.chunk_size),
            threshold: parse_env(&env, "LIVETALK_VAD_THRESHOLD")
                .or(fc.vad.threshold)
                .unwrap_or(defaults.threshold),
            min_speech_duration: seconds(
                "LIVETALK_MIN_SPEECH",
                fc.vad.min_speech_duration,
                defaults.min_speech_duration,
            )?,
            min_silence_duration: seconds(
                "LIVETALK_MIN_SILENCE",
                fc.vad.min_silence_duration,
                defaults.min_silence_duration,
            )?,
            interruption_threshold: seconds(
                "LIVETALK_INTERRUPTION_THRESHOLD",
                fc.vad.interruption_threshold,
                defaults.interruption_threshold,
            )?,
            pre_roll: seconds("LIVETALK_PRE_ROLL", fc.vad.pre_roll_seconds, defaults.pre_roll)?,
            frame_duration_ms: fc.vad.frame_duration_ms.unwrap_or(defaults.frame_duration_ms),
            queue_capacity: fc.vad.queue_capacity.unwrap_or(defaults.queue_capacity),
        };
        vad.validate()?;

        let conversation_defaults = ConversationConfig::default();
        let conversation = ConversationConfig {
            max_history: parse_env(&env, "LIVETALK_MAX_HISTORY")
                .or(fc.conversation.max_history)
                .unwrap_or(conversation_defaults.max_history),
            system_prompt: fc
                .conversation
                .system_prompt
                .or(conversation_defaults.system_prompt),
            welcome_message: env("LIVETALK_WELCOME_MESSAGE")
                .or(fc.conversation.welcome_message)
                .or(conversation_defaults.welcome_message)
                .filter(|m| !m.trim().is_empty()),
            enable_interruption: parse_env(&env, "LIVETALK_ENABLE_INTERRUPTION")
                .or(fc.conversation.enable_interruption)
                .unwrap_or(conversation_defaults.enable_interruption),
        };

        tracing::debug!(?vad, ?conversation, "resolved configuration");

        Ok(Self { vad, conversation })
    }
}

fn parse_env<F, T>(env: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    env(key).and_then(|s| s.trim().parse().ok())
}
