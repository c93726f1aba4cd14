//! Frame clock
//!
//! Monotonic milliseconds since the runtime started. The host reads it to
//! build animation reference times; the render thread passes it to the
//! animation scheduler every frame.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    epoch: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the clock was created
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}
