//! Hysteresis state tracking over per-chunk speech decisions
//!
//! A start is confirmed once speech has persisted for `min_speech_duration`,
//! an end once silence has persisted for `min_silence_duration`. Runs are
//! measured on the audio timeline from the start of the first chunk of the
//! run to the end of the current chunk.

use std::time::Duration;

use super::ChunkSpan;

/// Speech state of one tracked stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeechState {
    /// True between a confirmed start and a confirmed end
    pub speaking: bool,
    /// Start of the pending speech run, while not yet speaking
    pub speech_start_time: Option<Duration>,
    /// Start of the pending silence run, while speaking
    pub silence_start_time: Option<Duration>,
}

/// Result of feeding one decision to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerUpdate {
    /// A start was confirmed by this chunk
    pub speech_started: bool,
    /// An end was confirmed by this chunk
    pub speech_ended: bool,
    /// Speaking state after this chunk
    pub is_speaking: bool,
}

/// Debounced Silent/Speaking state machine
#[derive(Debug, Clone)]
pub struct HysteresisTracker {
    min_speech: Duration,
    min_silence: Duration,
    state: SpeechState,
}

impl HysteresisTracker {
    /// Create a tracker in the Silent state
    #[must_use]
    pub fn new(min_speech: Duration, min_silence: Duration) -> Self {
        Self {
            min_speech,
            min_silence,
            state: SpeechState::default(),
        }
    }

    /// Feed the decision for the chunk covering `span`
    pub fn update(&mut self, has_speech: bool, span: ChunkSpan) -> TrackerUpdate {
        let mut update = TrackerUpdate {
            is_speaking: self.state.speaking,
            ..TrackerUpdate::default()
        };

        if has_speech {
            self.state.silence_start_time = None;

            if !self.state.speaking {
                let run_start = *self.state.speech_start_time.get_or_insert(span.start);
                let run = span.end.saturating_sub(run_start);

                if run >= self.min_speech {
                    self.state.speaking = true;
                    self.state.speech_start_time = None;
                    update.speech_started = true;
                    update.is_speaking = true;
                    tracing::debug!(run_ms = run.as_millis(), at = ?span.end, "speech started");
                } else {
                    tracing::trace!(run_ms = run.as_millis(), "speech pending");
                }
            }
        } else {
            self.state.speech_start_time = None;

            if self.state.speaking {
                let run_start = *self.state.silence_start_time.get_or_insert(span.start);
                let run = span.end.saturating_sub(run_start);

                if run >= self.min_silence {
                    self.state.speaking = false;
                    self.state.silence_start_time = None;
                    update.speech_ended = true;
                    update.is_speaking = false;
                    tracing::debug!(silence_ms = run.as_millis(), at = ?span.end, "speech ended");
                } else {
                    tracing::trace!(silence_ms = run.as_millis(), "silence pending");
                }
            }
        }

        update
    }

    /// Clear both timers and force the Silent state
    pub fn reset(&mut self) {
        self.state = SpeechState::default();
    }

    /// Current state snapshot
    #[must_use]
    pub const fn state(&self) -> SpeechState {
        self.state
    }

    /// Whether a start has been confirmed and not yet ended
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.state.speaking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: Duration = Duration::from_millis(64);

    /// Feeds decisions on a 64 ms grid
    struct Feeder {
        tracker: HysteresisTracker,
        index: u32,
    }

    impl Feeder {
        fn new() -> Self {
            Self {
                tracker: HysteresisTracker::new(
                    Duration::from_millis(250),
                    Duration::from_millis(500),
                ),
                index: 0,
            }
        }

        fn feed(&mut self, has_speech: bool) -> TrackerUpdate {
            let span = ChunkSpan::new(CHUNK * self.index, CHUNK * (self.index + 1));
            self.index += 1;
            self.tracker.update(has_speech, span)
        }
    }

    #[test]
    fn test_start_confirmed_on_fourth_chunk() {
        let mut f = Feeder::new();
        for _ in 0..3 {
            let u = f.feed(true);
            assert!(!u.speech_started);
            assert!(!u.is_speaking);
        }
        let u = f.feed(true);
        assert!(u.speech_started);
        assert!(u.is_speaking);

        // No second start while speaking
        assert!(!f.feed(true).speech_started);
    }

    #[test]
    fn test_short_burst_never_starts() {
        let mut f = Feeder::new();
        for _ in 0..3 {
            f.feed(true);
        }
        for _ in 0..20 {
            let u = f.feed(false);
            assert!(!u.speech_started && !u.speech_ended && !u.is_speaking);
        }
    }

    #[test]
    fn test_negative_breaks_pending_run() {
        let mut f = Feeder::new();
        f.feed(true);
        f.feed(true);
        f.feed(false);
        f.feed(true);
        f.feed(true);
        assert!(!f.tracker.is_speaking());
        f.feed(true);
        assert!(f.feed(true).speech_started);
    }

    #[test]
    fn test_end_confirmed_on_eighth_silent_chunk() {
        let mut f = Feeder::new();
        for _ in 0..4 {
            f.feed(true);
        }
        for _ in 0..7 {
            let u = f.feed(false);
            assert!(!u.speech_ended);
            assert!(u.is_speaking);
        }
        let u = f.feed(false);
        assert!(u.speech_ended);
        assert!(!u.is_speaking);
        assert_eq!(f.tracker.state(), SpeechState::default());
    }

    #[test]
    fn test_short_pause_does_not_end() {
        let mut f = Feeder::new();
        for _ in 0..4 {
            f.feed(true);
        }
        for _ in 0..7 {
            f.feed(false);
        }
        assert!(f.tracker.state().silence_start_time.is_some());

        let u = f.feed(true);
        assert!(!u.speech_ended);
        assert!(u.is_speaking);
        assert!(f.tracker.state().silence_start_time.is_none());

        for _ in 0..7 {
            assert!(!f.feed(false).speech_ended);
        }
        assert!(f.feed(false).speech_ended);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut f = Feeder::new();
        for _ in 0..5 {
            f.feed(true);
        }
        f.feed(false);

        f.tracker.reset();
        let once = f.tracker.state();
        f.tracker.reset();
        assert_eq!(f.tracker.state(), once);
        assert_eq!(once, SpeechState::default());
    }

    #[test]
    fn test_zero_min_speech_starts_immediately() {
        let mut tracker = HysteresisTracker::new(Duration::ZERO, Duration::ZERO);
        let u = tracker.update(true, ChunkSpan::new(Duration::ZERO, CHUNK));
        assert!(u.speech_started);
        let u = tracker.update(false, ChunkSpan::new(CHUNK, CHUNK * 2));
        assert!(u.speech_ended);
    }
}
