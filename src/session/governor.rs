use std::time::{Duration, Instant};

/// Caps the producer at a target frame rate.
///
/// `pace` sleeps for whatever is left of the frame period since the previous
/// call. A frame that took longer than the period sleeps zero, so a slow
/// pipeline runs as fast as it can rather than accumulating debt.
#[derive(Debug)]
pub struct FrameGovernor {
    period: Duration,
    last: Instant,
}

impl FrameGovernor {
    /// `target_fps` of zero disables pacing.
    pub fn new(target_fps: u32) -> Self {
        let period = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(target_fps))
        };
        Self {
            period,
            last: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Instantaneous rate from the time spent since the previous `pace`.
    pub fn current_fps(&self) -> f32 {
        let secs = self.last.elapsed().as_secs_f32();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }

    /// Sleep out the remainder of the period. Returns how long it slept.
    pub fn pace(&mut self) -> Duration {
        let remaining = self.period.saturating_sub(self.last.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.last = Instant::now();
        remaining
    }
}
