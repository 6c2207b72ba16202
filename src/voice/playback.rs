//! Audio playback to speakers with hard-stop support

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;

use super::PlaybackControl;
use super::wav::{decode_wav, resample};
use crate::{Error, Result};

/// How often the blocking wait checks for completion or abort
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Slack past the nominal duration before playback is declared stuck
const WAIT_SLACK: Duration = Duration::from_millis(500);

/// Audio produced by a synthesizer
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesizedAudio {
    /// Normalized mono samples
    Pcm {
        /// Samples in [-1.0, 1.0]
        samples: Vec<f32>,
        /// Sample rate in Hz
        sample_rate: u32,
    },
    /// A WAV file in memory
    Wav(Vec<u8>),
    /// An MP3 stream in memory
    Mp3(Vec<u8>),
}

impl SynthesizedAudio {
    /// Decode into normalized mono samples and their rate
    ///
    /// # Errors
    ///
    /// Returns error if the encoded audio cannot be decoded
    pub fn decode(self) -> Result<(Vec<f32>, u32)> {
        match self {
            Self::Pcm {
                samples,
                sample_rate,
            } => Ok((samples, sample_rate)),
            Self::Wav(bytes) => decode_wav(&bytes),
            Self::Mp3(bytes) => decode_mp3(&bytes),
        }
    }
}

/// How a playback call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every sample was played
    Completed,
    /// Stopped early by [`PlaybackAbort`]
    Aborted,
}

/// Cloneable hard-stop handle for [`AudioPlayback`]
///
/// A stop request stays latched until [`reset`](Self::reset), so a request
/// that lands while audio is still being decoded is not lost.
#[derive(Debug, Clone, Default)]
pub struct PlaybackAbort(Arc<AtomicBool>);

impl PlaybackAbort {
    /// Clear a latched stop request
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether a stop has been requested since the last reset
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl PlaybackControl for PlaybackAbort {
    fn abort(&self) -> Result<()> {
        self.0.store(true, Ordering::Release);
        tracing::debug!("playback abort requested");
        Ok(())
    }
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    config: StreamConfig,
    abort: PlaybackAbort,
}

impl AudioPlayback {
    /// Open the default output device at its preferred configuration
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let config: StreamConfig = device
            .default_output_config()
            .map_err(|e| Error::Playback(e.to_string()))?
            .into();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            abort: PlaybackAbort::default(),
        })
    }

    /// Handle that stops the current playback
    #[must_use]
    pub fn abort_handle(&self) -> PlaybackAbort {
        self.abort.clone()
    }

    /// Play audio, blocking until it finishes or is aborted
    ///
    /// Does not clear a pending stop request; call
    /// [`PlaybackAbort::reset`] before announcing that playback is about to start.
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or the output stream cannot be built
    pub fn play(&self, audio: SynthesizedAudio) -> Result<PlaybackOutcome> {
        let (samples, rate) = audio.decode()?;
        let device_rate = self.config.sample_rate.0;
        let samples = if rate == device_rate {
            samples
        } else {
            resample(&samples, rate, device_rate)?
        };
        self.play_samples_blocking(samples)
    }

    #[allow(clippy::cast_precision_loss)]
    fn play_samples_blocking(&self, samples: Vec<f32>) -> Result<PlaybackOutcome> {
        if self.abort.is_set() {
            tracing::debug!("playback stopped before it started");
            return Ok(PlaybackOutcome::Aborted);
        }

        if samples.is_empty() {
            return Ok(PlaybackOutcome::Completed);
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device".to_string()))?;

        let channels = usize::from(self.config.channels.max(1));
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            let abort = self.abort.clone();

            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let stopped = abort.is_set();
                        let mut pos = position.load(Ordering::Relaxed);

                        for frame in data.chunks_mut(channels) {
                            let sample = if stopped {
                                0.0
                            } else if let Some(&s) = samples.get(pos) {
                                pos += 1;
                                s
                            } else {
                                0.0
                            };
                            frame.fill(sample);
                        }

                        position.store(pos, Ordering::Relaxed);
                        if stopped || pos >= samples.len() {
                            finished.store(true, Ordering::Release);
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Playback(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let nominal = Duration::from_secs_f64(
            sample_count as f64 / f64::from(self.config.sample_rate.0.max(1)),
        );
        let deadline = Instant::now() + nominal + WAIT_SLACK;

        while !finished.load(Ordering::Acquire) && !self.abort.is_set() {
            if Instant::now() > deadline {
                tracing::warn!("playback did not finish in time, stopping");
                break;
            }
            std::thread::sleep(WAIT_POLL);
        }

        drop(stream);

        let outcome = if self.abort.is_set() {
            PlaybackOutcome::Aborted
        } else {
            PlaybackOutcome::Completed
        };

        tracing::debug!(
            samples = sample_count,
            played = position.load(Ordering::Relaxed),
            ?outcome,
            "playback finished"
        );

        Ok(outcome)
    }
}

/// Decode MP3 bytes to normalized mono samples
#[allow(clippy::cast_precision_loss)]
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                let channels = frame.channels.max(1);
                samples.extend(frame.data.chunks(channels).map(|group| {
                    group.iter().map(|&s| f32::from(s) / 32768.0).sum::<f32>() / group.len() as f32
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Playback("MP3 stream contained no frames".to_string()));
    }

    Ok((samples, sample_rate))
}
