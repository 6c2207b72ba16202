//! Pre-roll buffering and utterance assembly

use std::collections::VecDeque;
use std::time::Duration;

use super::AudioChunk;
use crate::Result;

/// Bounded FIFO of the most recent chunks
///
/// Keeps the audio that preceded a confirmed onset so the first syllables
/// are not lost to the start debounce.
#[derive(Debug)]
pub struct PreRollBuffer {
    chunks: VecDeque<AudioChunk>,
    capacity: usize,
}

impl PreRollBuffer {
    /// Create a buffer holding at most `capacity` chunks (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: VecDeque::new(),
            capacity,
        }
    }

    /// Append a chunk, evicting the oldest when full
    pub fn push(&mut self, chunk: AudioChunk) {
        if self.chunks.len() == self.capacity {
            self.chunks.pop_front();
        }
        self.chunks.push_back(chunk);
    }

    /// Remove and return every chunk, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = AudioChunk> + '_ {
        self.chunks.drain(..)
    }

    /// Drop every chunk
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Chunks currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when no chunk is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Maximum chunks held
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A completed utterance: pre-roll plus every chunk up to the confirmed end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Contiguous mono 16-bit little-endian PCM
    pub pcm: Vec<u8>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Chunks concatenated into `pcm`
    pub chunks: usize,
    /// Timeline offset of the first chunk
    pub started_at: Duration,
}

impl Utterance {
    /// Number of samples
    #[must_use]
    pub fn samples(&self) -> usize {
        self.pcm.len() / 2
    }

    /// Playback duration
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples() as f64 / f64::from(self.sample_rate))
    }

    /// Encode as a mono 16-bit WAV file
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        super::wav::pcm_to_wav(&self.pcm, self.sample_rate)
    }
}

/// Accumulates chunks between a confirmed start and a confirmed end
#[derive(Debug, Default)]
pub struct UtteranceAssembler {
    chunks: Vec<AudioChunk>,
}

impl UtteranceAssembler {
    /// Create an empty assembler
    #[must_use]
    pub const fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Begin a new utterance with the pre-roll contents (oldest first), emptying it
    pub fn begin(&mut self, pre_roll: &mut PreRollBuffer) {
        self.chunks.clear();
        self.chunks.extend(pre_roll.drain());
    }

    /// Append a chunk to the utterance in progress
    pub fn push(&mut self, chunk: AudioChunk) {
        self.chunks.push(chunk);
    }

    /// Concatenate the accumulated chunks, leaving the assembler empty
    ///
    /// Returns `None` when nothing was accumulated.
    pub fn finish(&mut self) -> Option<Utterance> {
        let first = self.chunks.first()?;
        let sample_rate = first.sample_rate();
        let started_at = first.span().start;
        let chunks = self.chunks.len();

        let total: usize = self.chunks.iter().map(|c| c.pcm().len()).sum();
        let mut pcm = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            pcm.extend_from_slice(chunk.pcm());
        }

        Some(Utterance {
            pcm,
            sample_rate,
            chunks,
            started_at,
        })
    }

    /// Discard the utterance in progress
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Chunks accumulated so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when nothing has been accumulated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::StreamClock;

    fn tagged(tag: i16) -> AudioChunk {
        AudioChunk::from_samples(&[tag; 4], 16_000)
    }

    #[test]
    fn test_pre_roll_evicts_oldest() {
        let mut pre_roll = PreRollBuffer::new(3);
        for tag in 0..5 {
            pre_roll.push(tagged(tag));
            assert!(pre_roll.len() <= 3);
        }

        let kept: Vec<i16> = pre_roll.drain().map(|c| c.samples()[0]).collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert!(pre_roll.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut pre_roll = PreRollBuffer::new(0);
        assert_eq!(pre_roll.capacity(), 1);
        pre_roll.push(tagged(1));
        pre_roll.push(tagged(2));
        assert_eq!(pre_roll.len(), 1);
    }

    #[test]
    fn test_begin_splices_pre_roll_once() {
        let mut pre_roll = PreRollBuffer::new(4);
        pre_roll.push(tagged(1));
        pre_roll.push(tagged(2));

        let mut assembler = UtteranceAssembler::new();
        assembler.begin(&mut pre_roll);
        assert!(pre_roll.is_empty());
        assembler.push(tagged(3));

        let utterance = assembler.finish().unwrap();
        assert_eq!(utterance.chunks, 3);
        let first_samples: Vec<i16> = utterance
            .pcm
            .chunks_exact(8)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(first_samples, vec![1, 2, 3]);
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_finish_empty_yields_nothing() {
        let mut assembler = UtteranceAssembler::new();
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn test_utterance_metadata() {
        let mut clock = StreamClock::new(16_000);
        let _skipped = clock.stamp(AudioChunk::from_samples(&[0; 1024], 16_000));

        let mut assembler = UtteranceAssembler::new();
        assembler.push(clock.stamp(AudioChunk::from_samples(&[1; 1024], 16_000)));
        assembler.push(clock.stamp(AudioChunk::from_samples(&[1; 1024], 16_000)));

        let utterance = assembler.finish().unwrap();
        assert_eq!(utterance.samples(), 2048);
        assert_eq!(utterance.started_at, Duration::from_millis(64));
        assert_eq!(utterance.duration(), Duration::from_millis(128));
    }
}
