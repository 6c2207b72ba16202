//! Barge-in detection while the system is speaking

use std::time::Duration;

use super::ChunkSpan;

/// Detects a sustained user speech run during playback
///
/// Uses a single debounce threshold and no end detection. A run fires once;
/// the monitor then stays latched until a non-speech decision arrives.
#[derive(Debug, Clone)]
pub struct InterruptionMonitor {
    threshold: Duration,
    run_start: Option<Duration>,
    latched: bool,
}

impl InterruptionMonitor {
    /// Create a monitor that fires after `threshold` of continuous speech
    #[must_use]
    pub const fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            run_start: None,
            latched: false,
        }
    }

    /// Feed the decision for the chunk covering `span`
    ///
    /// Returns true on the chunk that completes a qualifying run.
    pub fn update(&mut self, has_speech: bool, span: ChunkSpan) -> bool {
        if !has_speech {
            self.run_start = None;
            self.latched = false;
            return false;
        }

        if self.latched {
            return false;
        }

        let run_start = *self.run_start.get_or_insert(span.start);
        let run = span.end.saturating_sub(run_start);

        if run >= self.threshold {
            tracing::debug!(run_ms = run.as_millis(), "user barge-in confirmed");
            self.run_start = None;
            self.latched = true;
            return true;
        }

        false
    }

    /// Clear any pending run
    pub fn disarm(&mut self) {
        self.run_start = None;
        self.latched = false;
    }

    /// Whether a speech run is being timed
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.run_start.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: Duration = Duration::from_millis(64);

    fn span(index: u32) -> ChunkSpan {
        ChunkSpan::new(CHUNK * index, CHUNK * (index + 1))
    }

    #[test]
    fn test_fires_on_fifth_chunk() {
        let mut monitor = InterruptionMonitor::new(Duration::from_millis(300));
        for i in 0..4 {
            assert!(!monitor.update(true, span(i)));
        }
        assert!(monitor.update(true, span(4)));
    }

    #[test]
    fn test_fires_once_per_run() {
        let mut monitor = InterruptionMonitor::new(Duration::from_millis(300));
        let fired = (0..20).filter(|&i| monitor.update(true, span(i))).count();
        assert_eq!(fired, 1);

        // A pause re-arms it
        assert!(!monitor.update(false, span(20)));
        let fired = (21..26).filter(|&i| monitor.update(true, span(i))).count();
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_gap_restarts_timer() {
        let mut monitor = InterruptionMonitor::new(Duration::from_millis(300));
        for i in 0..4 {
            monitor.update(true, span(i));
        }
        monitor.update(false, span(4));
        for i in 5..9 {
            assert!(!monitor.update(true, span(i)));
        }
        assert!(monitor.update(true, span(9)));
    }

    #[test]
    fn test_disarm_clears_pending_run() {
        let mut monitor = InterruptionMonitor::new(Duration::from_millis(300));
        for i in 0..4 {
            monitor.update(true, span(i));
        }
        assert!(monitor.is_pending());

        monitor.disarm();
        assert!(!monitor.is_pending());
        assert!(!monitor.update(true, span(4)));
    }
}
