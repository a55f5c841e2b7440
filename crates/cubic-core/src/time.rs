// SPDX-License-Identifier: CEPL-1.0
use std::time::Instant;

/// Seconds elapsed between `start` and `now`, as used for animation.
///
/// Returns 0.0 when `now` is earlier than `start` instead of panicking.
pub fn seconds_between(start: Instant, now: Instant) -> f32 {
    now.saturating_duration_since(start).as_secs_f32()
}

/// Monotonic clock started when the renderer comes up.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    start: Instant,
}

impl FrameClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f32 {
        seconds_between(self.start, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_seconds_between_forward() {
        let start = Instant::now();
        let later = start + Duration::from_millis(1500);
        let secs = seconds_between(start, later);
        assert!((secs - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_seconds_between_backwards_is_zero() {
        let start = Instant::now() + Duration::from_secs(5);
        assert_eq!(seconds_between(start, Instant::now()), 0.0);
    }

    #[test]
    fn test_frame_clock_is_monotonic() {
        let clock = FrameClock::start();
        let a = clock.elapsed_seconds();
        let b = clock.elapsed_seconds();
        assert!(b >= a);
    }
}
