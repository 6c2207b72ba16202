//! Audio chunks and the stream clock that positions them

use std::time::Duration;

/// Position of a chunk on the audio timeline, `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkSpan {
    /// Offset of the first sample since the stream started
    pub start: Duration,
    /// Offset just past the last sample
    pub end: Duration,
}

impl ChunkSpan {
    /// Create a span from its bounds
    #[must_use]
    pub const fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    /// Length of the span
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// An immutable slice of mono 16-bit little-endian PCM
///
/// Produced by the capture driver and consumed exactly once by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pcm: Vec<u8>,
    sample_rate: u32,
    span: ChunkSpan,
}

impl AudioChunk {
    /// Wrap raw PCM bytes; a trailing odd byte is dropped
    #[must_use]
    pub fn new(mut pcm: Vec<u8>, sample_rate: u32) -> Self {
        if pcm.len() % 2 != 0 {
            pcm.pop();
        }
        Self {
            pcm,
            sample_rate,
            span: ChunkSpan::default(),
        }
    }

    /// Build a chunk from signed 16-bit samples
    #[must_use]
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let pcm = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(pcm, sample_rate)
    }

    /// Build a chunk from float samples in `[-1.0, 1.0]`
    #[must_use]
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let converted: Vec<i16> = samples.iter().map(|&s| f32_to_i16(s)).collect();
        Self::from_samples(&converted, sample_rate)
    }

    /// Attach a timeline position
    #[must_use]
    pub const fn with_span(mut self, span: ChunkSpan) -> Self {
        self.span = span;
        self
    }

    /// Raw PCM bytes
    #[must_use]
    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    /// Consume the chunk, returning its bytes
    #[must_use]
    pub fn into_pcm(self) -> Vec<u8> {
        self.pcm
    }

    /// Decoded signed samples
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    /// Samples normalized to `[-1.0, 1.0)`
    #[must_use]
    pub fn normalized(&self) -> Vec<f32> {
        self.pcm
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
            .collect()
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.pcm.len() / 2
    }

    /// True when the chunk carries no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Timeline position assigned by the stream clock
    #[must_use]
    pub const fn span(&self) -> ChunkSpan {
        self.span
    }

    /// Playback duration of the samples
    #[must_use]
    pub fn duration(&self) -> Duration {
        samples_duration(self.len() as u64, self.sample_rate)
    }
}

/// Stamps chunks with their position on the audio timeline
///
/// Time advances by sample count, never by wall clock, so the hysteresis
/// timers see exactly the audio that was delivered.
#[derive(Debug, Clone, Default)]
pub struct StreamClock {
    samples: u64,
    sample_rate: u32,
}

impl StreamClock {
    /// Create a clock for the given sample rate
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            samples: 0,
            sample_rate,
        }
    }

    /// Current position (end of the last stamped chunk)
    #[must_use]
    pub fn now(&self) -> Duration {
        samples_duration(self.samples, self.sample_rate)
    }

    /// Advance past `chunk` and return it with its span set
    #[must_use]
    pub fn stamp(&mut self, chunk: AudioChunk) -> AudioChunk {
        let start = self.now();
        self.samples += chunk.len() as u64;
        let end = self.now();
        chunk.with_span(ChunkSpan::new(start, end))
    }
}

/// Convert a float sample in `[-1.0, 1.0]` to i16
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

fn samples_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = u64::from(sample_rate);
    let secs = samples / rate;
    let nanos = (samples % rate) * 1_000_000_000 / rate;
    Duration::new(secs, u32::try_from(nanos).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversion() {
        let chunk = AudioChunk::from_samples(&[0, 1, -1, i16::MAX, i16::MIN], 16_000);
        assert_eq!(chunk.len(), 5);
        assert_eq!(chunk.pcm().len(), 10);
        assert_eq!(chunk.samples(), vec![0, 1, -1, i16::MAX, i16::MIN]);

        let norm = chunk.normalized();
        assert!((norm[4] + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_odd_byte_dropped() {
        let chunk = AudioChunk::new(vec![1, 2, 3], 16_000);
        assert_eq!(chunk.len(), 1);
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk::from_samples(&[0; 1024], 16_000);
        assert_eq!(chunk.duration(), Duration::from_millis(64));
    }

    #[test]
    fn test_stream_clock_spans_are_contiguous() {
        let mut clock = StreamClock::new(16_000);
        let a = clock.stamp(AudioChunk::from_samples(&[0; 1024], 16_000));
        let b = clock.stamp(AudioChunk::from_samples(&[0; 1024], 16_000));

        assert_eq!(a.span().start, Duration::ZERO);
        assert_eq!(a.span().end, Duration::from_millis(64));
        assert_eq!(b.span().start, a.span().end);
        assert_eq!(b.span().duration(), Duration::from_millis(64));
        assert_eq!(clock.now(), Duration::from_millis(128));
    }
}
