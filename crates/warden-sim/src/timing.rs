//! Fixed timestep accumulation.
//!
//! The harness runs headless, so frame deltas are synthesized instead of
//! measured. Variable-length frames are folded into fixed AI ticks.

/// Default tick rate of the AI in Hz.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Fixed timestep accumulator.
#[derive(Debug, Clone)]
pub struct FixedStep {
    /// Length of one tick in seconds
    fixed_dt: f32,
    /// Unconsumed time
    accumulator: f32,
    /// Largest frame delta accepted (spiral-of-death guard)
    max_dt: f32,
    /// Total ticks produced
    ticks: u64,
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE)
    }
}

impl FixedStep {
    /// Creates an accumulator ticking at `rate` Hz.
    #[must_use]
    pub fn new(rate: u32) -> Self {
        Self {
            fixed_dt: 1.0 / rate.max(1) as f32,
            accumulator: 0.0,
            max_dt: 0.25,
            ticks: 0,
        }
    }

    /// Overrides the frame delta clamp.
    #[must_use]
    pub fn with_max_dt(mut self, max_dt: f32) -> Self {
        self.max_dt = max_dt.max(self.fixed_dt);
        self
    }

    /// Length of one tick in seconds.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Ticks produced so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated seconds covered by the produced ticks.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.ticks as f64 * f64::from(self.fixed_dt)
    }

    /// Feeds a frame delta and returns how many fixed ticks are due.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.clamp(0.0, self.max_dt);

        let mut updates = 0;
        while self.accumulator >= self.fixed_dt {
            self.accumulator -= self.fixed_dt;
            updates += 1;
        }
        self.ticks += u64::from(updates);
        updates
    }

    /// Fraction of a tick left in the accumulator.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.fixed_dt
    }

    /// Drops any unconsumed time.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
