//! Logical clock and periodic tasks.
//!
//! The graph never reads wall time. The host feeds real elapsed time into
//! [`TimingHandler::handle`] once per frame; everything downstream (node
//! modification stamps, interpolator stepping) is derived from the frame
//! count and the last delta recorded here.

/// Maximum number of task firings consumed per tick when catching up after
/// a long frame. Prevents the accumulator spiral-of-death.
const MAX_CATCH_UP: u32 = 5;

/// Logical frame clock. `frame_count` stamps node modifications; `delta_ms`
/// is what periodic tasks are polled against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingHandler {
    frame_count: u64,
    time_ms: f64,
    delta_ms: f32,
}

impl TimingHandler {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            time_ms: 0.0,
            delta_ms: 0.0,
        }
    }

    /// Advance the clock by `delta_ms` of host time. Call once per frame.
    pub fn handle(&mut self, delta_ms: f32) {
        self.frame_count += 1;
        self.time_ms += delta_ms.max(0.0) as f64;
        self.delta_ms = delta_ms.max(0.0);
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Accumulated logical time in milliseconds.
    #[inline]
    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    /// Delta of the last `handle` call in milliseconds.
    #[inline]
    pub fn delta_ms(&self) -> f32 {
        self.delta_ms
    }
}

impl Default for TimingHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic task driven by frame deltas. Accumulates elapsed time and
/// reports how many periods came due, capped so a stalled host cannot queue
/// an unbounded burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Task {
    period_ms: f32,
    active: bool,
    accumulator_ms: f32,
}

impl Task {
    pub fn new() -> Self {
        Self {
            period_ms: 40.0,
            active: false,
            accumulator_ms: 0.0,
        }
    }

    /// Start (or restart) firing every `period_ms` milliseconds.
    pub fn run(&mut self, period_ms: f32) {
        if period_ms > 0.0 {
            self.period_ms = period_ms;
        }
        self.active = true;
        self.accumulator_ms = 0.0;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.accumulator_ms = 0.0;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn period_ms(&self) -> f32 {
        self.period_ms
    }

    pub fn set_period_ms(&mut self, period_ms: f32) {
        if period_ms > 0.0 {
            self.period_ms = period_ms;
        }
    }

    /// Feed `delta_ms` of elapsed time; returns how many firings came due
    /// (0 when inactive). Catch-up is capped at [`MAX_CATCH_UP`]; the capped
    /// firings consume their share of the accumulator so the task keeps
    /// catching up over the following frames.
    pub fn tick(&mut self, delta_ms: f32) -> u32 {
        if !self.active {
            return 0;
        }
        self.accumulator_ms += delta_ms.max(0.0);
        if self.accumulator_ms < self.period_ms {
            return 0;
        }
        let due = (self.accumulator_ms / self.period_ms).floor() as u32;
        let clamped = due.min(MAX_CATCH_UP);
        self.accumulator_ms -= self.period_ms * clamped as f32;
        clamped
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}
