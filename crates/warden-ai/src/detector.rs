//! Player detection polling.
//!
//! While the player is inside an NPC's detection trigger, the NPC samples
//! visibility on its own fixed cadence, independent of the main tick. The
//! first sample is taken as soon as polling starts.

use serde::{Deserialize, Serialize};

/// Fixed-interval visibility poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDetector {
    poll_interval: f32,
    polling: bool,
    until_next: f32,
}

impl PlayerDetector {
    /// Creates an idle detector.
    #[must_use]
    pub fn new(poll_interval: f32) -> Self {
        Self {
            poll_interval: poll_interval.max(f32::EPSILON),
            polling: false,
            until_next: 0.0,
        }
    }

    /// Starts polling. Does nothing if already polling.
    pub fn start(&mut self) {
        if self.polling {
            return;
        }
        self.polling = true;
        self.until_next = 0.0;
    }

    /// Stops polling.
    pub fn stop(&mut self) {
        self.polling = false;
    }

    /// Returns true while polling.
    #[must_use]
    pub const fn is_polling(&self) -> bool {
        self.polling
    }

    /// Advances the poll clock. Returns true if a sample is due this tick.
    pub fn advance(&mut self, dt: f32) -> bool {
        if !self.polling {
            return false;
        }
        self.until_next -= dt;
        if self.until_next > 0.0 {
            return false;
        }
        self.until_next = (self.until_next + self.poll_interval).max(0.0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_detector_never_polls() {
        let mut detector = PlayerDetector::new(0.1);
        assert!(!detector.advance(1.0));
    }

    #[test]
    fn test_first_sample_is_immediate() {
        let mut detector = PlayerDetector::new(0.1);
        detector.start();
        assert!(detector.advance(0.0));
        assert!(!detector.advance(0.05));
        assert!(detector.advance(0.06));
    }

    #[test]
    fn test_restart_while_polling_keeps_cadence() {
        let mut detector = PlayerDetector::new(0.1);
        detector.start();
        detector.advance(0.0);
        detector.start();
        assert!(!detector.advance(0.02));
        detector.stop();
        assert!(!detector.is_polling());
        assert!(!detector.advance(1.0));
    }
}
