//! Presentation timestamp clock
//!
//! Audio frames are stamped on the feed's clock when captured; each writer
//! rebases them onto its own recording start so both tracks of a file share
//! time zero.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic clock for presentation timestamps
#[derive(Debug, Clone)]
pub struct PTSClock {
    start: Arc<Instant>,
}

impl PTSClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Seconds since the clock started
    #[inline]
    pub fn pts(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Seconds between the clock start and `instant`, zero if earlier
    #[inline]
    pub fn pts_at(&self, instant: Instant) -> f64 {
        instant
            .checked_duration_since(*self.start)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl Default for PTSClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_pts_monotonic() {
        let clock = PTSClock::new();
        let pts1 = clock.pts();
        thread::sleep(Duration::from_millis(10));
        let pts2 = clock.pts();
        assert!(pts2 > pts1, "PTS must be monotonically increasing");
    }

    #[test]
    fn test_clones_share_time_zero() {
        let clock = PTSClock::new();
        let shared = clock.clone();
        thread::sleep(Duration::from_millis(5));
        assert!((clock.pts() - shared.pts()).abs() < 0.001);
    }

    #[test]
    fn test_pts_at_before_start_is_zero() {
        let before = Instant::now();
        thread::sleep(Duration::from_millis(2));
        let clock = PTSClock::new();
        assert_eq!(clock.pts_at(before), 0.0);
    }
}
