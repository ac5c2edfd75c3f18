//! Time management utilities
//!
//! The engine never reads the wall clock directly: the platform reports a
//! monotonically increasing time in seconds and [`Timer`] derives frame
//! deltas from it. [`FixedStep`] turns those deltas into a bounded number of
//! fixed-size simulation steps.

/// Frame timer driven by platform time
#[derive(Debug, Clone)]
pub struct Timer {
    last_time: Option<f64>,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_time: None,
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer with the current platform time (once per frame)
    ///
    /// The first call establishes the time base and yields a zero delta.
    /// Time going backwards is treated as a zero-length frame.
    pub fn update(&mut self, now: f64) {
        self.delta_time = match self.last_time {
            Some(last) => (now - last).max(0.0) as f32,
            None => 0.0,
        };
        self.total_time += self.delta_time;
        self.last_time = Some(now);
        self.frame_count += 1;
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since the first update
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the current FPS (based on last frame time)
    pub fn current_fps(&self) -> f32 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }
}

/// Fixed-step debt accumulator
///
/// Elapsed time is added every frame and drained in `step` sized chunks. At
/// most `max_steps` chunks are drained per frame; when the cap is hit the
/// leftover debt is clamped below one step so a stalled frame cannot snowball.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: f32,
    max_steps: u32,
    accumulator: f32,
}

impl FixedStep {
    /// Create an accumulator for the given step size and per-frame cap
    pub fn new(step: f32, max_steps: u32) -> Self {
        Self {
            step,
            max_steps: max_steps.max(1),
            accumulator: 0.0,
        }
    }

    /// Fixed step size in seconds
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Time owed but not yet simulated
    pub fn pending(&self) -> f32 {
        self.accumulator
    }

    /// Add frame time and return how many fixed steps to run this frame
    pub fn accumulate(&mut self, delta_time: f32) -> u32 {
        if self.step <= 0.0 {
            return 0;
        }

        self.accumulator += delta_time.max(0.0);

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }

        if steps == self.max_steps && self.accumulator >= self.step {
            log::debug!(
                "Fixed step cap reached ({} steps), dropping {:.3}s of debt",
                steps,
                self.accumulator - self.accumulator % self.step
            );
            self.accumulator %= self.step;
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_timer_first_frame_has_zero_delta() {
        let mut timer = Timer::new();
        timer.update(10.0);
        assert_eq!(timer.delta_time(), 0.0);
        timer.update(10.5);
        assert_relative_eq!(timer.delta_time(), 0.5);
        assert_relative_eq!(timer.total_time(), 0.5);
        assert_eq!(timer.frame_count(), 2);
    }

    #[test]
    fn test_fixed_step_drains_whole_steps() {
        let mut fixed = FixedStep::new(0.02, 8);
        assert_eq!(fixed.accumulate(0.05), 2);
        assert_relative_eq!(fixed.pending(), 0.01, epsilon = 1e-6);
        assert_eq!(fixed.accumulate(0.015), 1);
    }

    #[test]
    fn test_fixed_step_cap_drops_excess_debt() {
        let mut fixed = FixedStep::new(0.01, 4);
        assert_eq!(fixed.accumulate(1.0), 4);
        assert!(fixed.pending() < 0.01);
    }
}
