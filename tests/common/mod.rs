//! Shared test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use livetalk::config::VadConfig;
use livetalk::voice::{AudioChunk, EnergyClassifier, PlaybackControl, VoicePipeline};

/// Sample rate used throughout the integration tests
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per chunk (64 ms at 16 kHz)
pub const CHUNK_SIZE: usize = 1024;

/// Generate sine wave audio samples
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// One chunk of a 440 Hz tone well above the default energy threshold
pub fn loud_chunk() -> AudioChunk {
    let samples = generate_sine_samples(440.0, 1.0, 0.5);
    AudioChunk::from_f32(&samples[..CHUNK_SIZE], SAMPLE_RATE)
}

/// One chunk of digital silence
pub fn silent_chunk() -> AudioChunk {
    AudioChunk::from_samples(&[0; CHUNK_SIZE], SAMPLE_RATE)
}

/// A chunk whose every sample is `tag`, loud when `tag` is large
pub fn tagged_chunk(tag: i16) -> AudioChunk {
    AudioChunk::from_samples(&[tag; CHUNK_SIZE], SAMPLE_RATE)
}

/// Default engine configuration: 16 kHz, 1024-sample chunks, 1 s pre-roll
pub fn vad_config() -> VadConfig {
    VadConfig::default()
}

/// Pipeline over the energy classifier with the default configuration
pub fn energy_pipeline() -> VoicePipeline {
    let config = vad_config();
    VoicePipeline::new(&config, Box::new(EnergyClassifier::new(config.threshold)))
}

/// Playback control that counts abort calls
#[derive(Debug, Default)]
pub struct CountingAbort {
    calls: AtomicUsize,
}

impl CountingAbort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlaybackControl for CountingAbort {
    fn abort(&self) -> livetalk::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `check` until it holds or two seconds pass
pub fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}
