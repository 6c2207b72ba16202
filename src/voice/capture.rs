//! Microphone capture into the chunk queue

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::chunk::f32_to_i16;
use super::{AudioChunk, ChunkSender};
use crate::{Error, Result};

/// Mixes interleaved device frames down to mono 16-bit PCM and cuts it into chunks
///
/// Samples go straight into the byte buffer the emitted chunk takes over.
pub(crate) struct ChunkSlicer {
    pending: Vec<u8>,
    chunk_bytes: usize,
    channels: usize,
    sample_rate: u32,
}

impl ChunkSlicer {
    pub(crate) fn new(chunk_size: usize, channels: usize, sample_rate: u32) -> Self {
        let chunk_bytes = chunk_size.max(1) * 2;
        Self {
            pending: Vec::with_capacity(chunk_bytes * 2),
            chunk_bytes,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Append interleaved frames, handing every completed chunk to `emit`
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn push(&mut self, data: &[f32], mut emit: impl FnMut(AudioChunk)) {
        for frame in data.chunks(self.channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            self.pending.extend_from_slice(&f32_to_i16(mono).to_le_bytes());

            if self.pending.len() == self.chunk_bytes {
                let mut pcm = Vec::with_capacity(self.chunk_bytes);
                std::mem::swap(&mut pcm, &mut self.pending);
                emit(AudioChunk::new(pcm, self.sample_rate));
            }
        }
    }
}

/// Captures audio from the default input device in fixed-size chunks
///
/// The device callback only slices, converts and pushes; it never blocks.
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    chunk_size: usize,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device at `sample_rate`
    ///
    /// Mono is preferred; multi-channel input is mixed down in the callback.
    ///
    /// # Errors
    ///
    /// Returns error if no device supports the requested rate
    pub fn new(sample_rate: u32, chunk_size: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && supports_rate(c))
            .or_else(|| {
                device
                    .supported_input_configs()
                    .ok()?
                    .find(|c| supports_rate(c))
            })
            .ok_or_else(|| {
                Error::Audio(format!("no input config supports {sample_rate} Hz"))
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            chunk_size,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            chunk_size: chunk_size.max(1),
            stream: None,
        })
    }

    /// Start streaming chunks into `sender`
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self, sender: ChunkSender) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut slicer = ChunkSlicer::new(
            self.chunk_size,
            usize::from(self.config.channels),
            self.config.sample_rate.0,
        );

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    slicer.push(data, |chunk| {
                        sender.push(chunk);
                    });
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Sample rate of produced chunks
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
