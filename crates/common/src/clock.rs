//! Clock and timing utilities for frame timestamps.
//!
//! Every frame carries a monotonic timestamp in nanoseconds relative to a
//! fixed epoch. Backends that do not receive timestamps from the OS stamp
//! frames with a [`CaptureClock`] shared by the session.

use std::time::{Duration, Instant};

/// A monotonic clock anchored to the moment it was created.
#[derive(Debug, Clone)]
pub struct CaptureClock {
    /// The instant the clock was anchored.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl CaptureClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Nanoseconds elapsed since the epoch.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Seconds elapsed since the epoch.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at the epoch.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Convert a nanosecond timestamp to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Paces a producer loop at a fixed frame rate.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl FramePacer {
    /// Create a pacer targeting the given rate. A rate of 0 is treated as 1 Hz.
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_nanos(1_000_000_000 / fps.max(1) as u64),
            next_deadline: None,
        }
    }

    /// Time to wait before the next frame is due. The first call is always zero.
    ///
    /// Missed deadlines are not made up; the schedule restarts from now.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        match self.next_deadline {
            None => {
                self.next_deadline = Some(now + self.interval);
                Duration::ZERO
            }
            Some(deadline) if deadline > now => {
                self.next_deadline = Some(deadline + self.interval);
                deadline - now
            }
            Some(_) => {
                self.next_deadline = Some(now + self.interval);
                Duration::ZERO
            }
        }
    }

    /// Target interval between frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = CaptureClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = CaptureClock::start();
        let a = clock.elapsed_ns();
        let b = clock.elapsed_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((CaptureClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_frame_pacer() {
        let mut pacer = FramePacer::new(50);
        assert_eq!(pacer.interval(), Duration::from_millis(20));

        let t0 = Instant::now();
        assert_eq!(pacer.wait_time(t0), Duration::ZERO);
        assert_eq!(
            pacer.wait_time(t0 + Duration::from_millis(5)),
            Duration::from_millis(15)
        );
        // Late by a whole interval: no catch-up burst.
        assert_eq!(pacer.wait_time(t0 + Duration::from_millis(100)), Duration::ZERO);
    }

    #[test]
    fn test_frame_pacer_zero_fps() {
        let pacer = FramePacer::new(0);
        assert_eq!(pacer.interval(), Duration::from_secs(1));
    }
}
