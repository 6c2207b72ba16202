//! Per-chunk speech/non-speech classification
//!
//! Three interchangeable strategies share the [`Classifier`] trait:
//! - energy: RMS of the normalized samples against a scaled threshold (always available)
//! - model-based: an external [`SpeechModel`] scoring fixed-size frames
//! - frame-classifier: an external [`FrameVad`] voting on 10/20/30 ms sub-frames
//!
//! The capability-gated strategies fall back to energy on their first
//! backend failure and stay there for the rest of the session.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::AudioChunk;
use crate::config::VadConfig;
use crate::{Error, Result};

/// Energy threshold scale: speech iff `rms > threshold * ENERGY_SCALE`
pub const ENERGY_SCALE: f32 = 0.02;

/// Sample rates a frame classifier accepts
const FRAME_VAD_RATES: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Speech classifier strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VadMethod {
    /// RMS energy threshold
    Energy,
    /// External probabilistic speech model
    ModelBased,
    /// External fixed-frame binary VAD
    FrameClassifier,
}

impl fmt::Display for VadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Energy => write!(f, "energy"),
            Self::ModelBased => write!(f, "model-based"),
            Self::FrameClassifier => write!(f, "frame-classifier"),
        }
    }
}

impl FromStr for VadMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "energy" => Ok(Self::Energy),
            "model-based" => Ok(Self::ModelBased),
            "frame-classifier" => Ok(Self::FrameClassifier),
            other => Err(Error::Config(format!(
                "unknown vad method '{other}' (expected energy, model-based or frame-classifier)"
            ))),
        }
    }
}

/// Verdict for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierDecision {
    /// Whether the chunk contains speech
    pub is_speech: bool,
    /// Strategy that produced the verdict (diagnostics only)
    pub method: VadMethod,
}

/// Turns a chunk into a speech/non-speech decision
///
/// Runs once per chunk on the processing thread, so implementations must be
/// deterministic for a given input and internal state and must not block.
pub trait Classifier: Send {
    /// Classify one chunk
    fn classify(&mut self, chunk: &AudioChunk) -> ClassifierDecision;

    /// Strategy currently in effect
    fn method(&self) -> VadMethod;
}

/// External speech probability model (e.g. a neural VAD)
pub trait SpeechModel: Send {
    /// Samples per inference frame at `sample_rate`
    fn frame_size(&self, sample_rate: u32) -> usize;

    /// Probability in `[0, 1]` that `frame` contains speech
    ///
    /// # Errors
    ///
    /// Returns error if inference fails
    fn speech_probability(&mut self, frame: &[f32], sample_rate: u32) -> Result<f32>;
}

/// External binary VAD operating on fixed 10/20/30 ms frames
pub trait FrameVad: Send {
    /// Whether `frame` contains speech
    ///
    /// # Errors
    ///
    /// Returns error if the frame is rejected or the backend fails
    fn is_speech(&mut self, frame: &[i16], sample_rate: u32) -> Result<bool>;
}

/// Optional backends for the capability-gated strategies
#[derive(Default)]
pub struct ClassifierBackends {
    /// Backend for [`VadMethod::ModelBased`]
    pub speech_model: Option<Box<dyn SpeechModel>>,
    /// Backend for [`VadMethod::FrameClassifier`]
    pub frame_vad: Option<Box<dyn FrameVad>>,
}

/// Root-mean-square of normalized samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Stateless RMS energy classifier
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    /// Create an energy classifier with a `0.0..=1.0` threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// RMS level above which a chunk counts as speech
    #[must_use]
    pub fn level(&self) -> f32 {
        self.threshold * ENERGY_SCALE
    }

    fn detect(&self, chunk: &AudioChunk) -> bool {
        if chunk.is_empty() {
            return false;
        }
        rms(&chunk.normalized()) > self.level()
    }
}

impl Classifier for EnergyClassifier {
    fn classify(&mut self, chunk: &AudioChunk) -> ClassifierDecision {
        ClassifierDecision {
            is_speech: self.detect(chunk),
            method: VadMethod::Energy,
        }
    }

    fn method(&self) -> VadMethod {
        VadMethod::Energy
    }
}

/// Classifier backed by a [`SpeechModel`]
///
/// The chunk is split into model-sized frames (the last one zero-padded) and
/// the maximum frame probability is compared against the threshold.
pub struct ModelClassifier {
    model: Option<Box<dyn SpeechModel>>,
    threshold: f32,
    fallback: EnergyClassifier,
}

impl ModelClassifier {
    /// Create a model-based classifier
    #[must_use]
    pub fn new(model: Box<dyn SpeechModel>, threshold: f32) -> Self {
        Self {
            model: Some(model),
            threshold,
            fallback: EnergyClassifier::new(threshold),
        }
    }

    fn max_probability(model: &mut dyn SpeechModel, chunk: &AudioChunk) -> Result<f32> {
        let sample_rate = chunk.sample_rate();
        let frame_size = model.frame_size(sample_rate);
        if frame_size == 0 {
            return Err(Error::Classifier(format!(
                "speech model reports no frame size for {sample_rate} Hz"
            )));
        }

        let samples = chunk.normalized();
        let mut frame = vec![0.0f32; frame_size];
        let mut max_prob = 0.0f32;

        for part in samples.chunks(frame_size) {
            frame[..part.len()].copy_from_slice(part);
            frame[part.len()..].fill(0.0);
            let prob = model.speech_probability(&frame, sample_rate)?;
            max_prob = max_prob.max(prob);
        }

        Ok(max_prob)
    }
}

impl Classifier for ModelClassifier {
    fn classify(&mut self, chunk: &AudioChunk) -> ClassifierDecision {
        if chunk.is_empty() {
            return ClassifierDecision {
                is_speech: false,
                method: self.method(),
            };
        }

        if let Some(model) = self.model.as_deref_mut() {
            match Self::max_probability(model, chunk) {
                Ok(prob) => {
                    return ClassifierDecision {
                        is_speech: prob > self.threshold,
                        method: VadMethod::ModelBased,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "speech model failed, falling back to energy VAD for this session"
                    );
                    self.model = None;
                }
            }
        }

        self.fallback.classify(chunk)
    }

    fn method(&self) -> VadMethod {
        if self.model.is_some() {
            VadMethod::ModelBased
        } else {
            VadMethod::Energy
        }
    }
}

/// Classifier backed by a [`FrameVad`]
///
/// Only complete sub-frames are evaluated; any positive sub-frame makes the
/// whole chunk speech.
pub struct FrameClassifier {
    vad: Option<Box<dyn FrameVad>>,
    frame_len: usize,
    fallback: EnergyClassifier,
}

impl FrameClassifier {
    /// Create a frame classifier
    ///
    /// # Errors
    ///
    /// Returns error if the sample rate or frame duration is unsupported
    pub fn new(
        vad: Box<dyn FrameVad>,
        frame_duration_ms: u32,
        sample_rate: u32,
        threshold: f32,
    ) -> Result<Self> {
        if !FRAME_VAD_RATES.contains(&sample_rate) {
            return Err(Error::Classifier(format!(
                "frame classifier does not support {sample_rate} Hz"
            )));
        }
        if !matches!(frame_duration_ms, 10 | 20 | 30) {
            return Err(Error::Classifier(format!(
                "frame classifier does not support {frame_duration_ms} ms frames"
            )));
        }

        let frame_len = (sample_rate * frame_duration_ms / 1000) as usize;

        Ok(Self {
            vad: Some(vad),
            frame_len,
            fallback: EnergyClassifier::new(threshold),
        })
    }

    /// Samples per sub-frame
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn any_speech(vad: &mut dyn FrameVad, frame_len: usize, chunk: &AudioChunk) -> Result<bool> {
        let samples = chunk.samples();
        for frame in samples.chunks_exact(frame_len) {
            if vad.is_speech(frame, chunk.sample_rate())? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Classifier for FrameClassifier {
    fn classify(&mut self, chunk: &AudioChunk) -> ClassifierDecision {
        if chunk.is_empty() {
            return ClassifierDecision {
                is_speech: false,
                method: self.method(),
            };
        }

        if let Some(vad) = self.vad.as_deref_mut() {
            match Self::any_speech(vad, self.frame_len, chunk) {
                Ok(is_speech) => {
                    return ClassifierDecision {
                        is_speech,
                        method: VadMethod::FrameClassifier,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "frame classifier failed, falling back to energy VAD for this session"
                    );
                    self.vad = None;
                }
            }
        }

        self.fallback.classify(chunk)
    }

    fn method(&self) -> VadMethod {
        if self.vad.is_some() {
            VadMethod::FrameClassifier
        } else {
            VadMethod::Energy
        }
    }
}

/// Build the configured classifier, downgrading to energy when its backend is unavailable
#[must_use]
pub fn build_classifier(config: &VadConfig, backends: ClassifierBackends) -> Box<dyn Classifier> {
    let energy = EnergyClassifier::new(config.threshold);

    match config.method {
        VadMethod::Energy => {
            tracing::info!(level = energy.level(), "using energy-based VAD");
            Box::new(energy)
        }
        VadMethod::ModelBased => {
            if let Some(model) = backends.speech_model {
                tracing::info!(threshold = config.threshold, "using model-based VAD");
                Box::new(ModelClassifier::new(model, config.threshold))
            } else {
                tracing::warn!("speech model not available, falling back to energy-based VAD");
                Box::new(energy)
            }
        }
        VadMethod::FrameClassifier => {
            let Some(vad) = backends.frame_vad else {
                tracing::warn!("frame classifier not available, falling back to energy-based VAD");
                return Box::new(energy);
            };

            match FrameClassifier::new(
                vad,
                config.frame_duration_ms,
                config.sample_rate,
                config.threshold,
            ) {
                Ok(classifier) => {
                    tracing::info!(
                        frame_ms = config.frame_duration_ms,
                        "using frame-classifier VAD"
                    );
                    Box::new(classifier)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to energy-based VAD");
                    Box::new(energy)
                }
            }
        }
    }
}
