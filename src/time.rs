use std::time::{Duration, Instant};

/// Frame pacing for the headless loop: sleeps out the remainder of each
/// fixed-rate frame and tracks the last frame's wall time.
pub struct FrameClock {
    target: Duration,
    last: Instant,
    pub delta: Duration,
}

impl FrameClock {
    pub fn new(target_hz: u32) -> Self {
        Self {
            target: Duration::from_secs_f64(1.0 / target_hz.max(1) as f64),
            last: Instant::now(),
            delta: Duration::ZERO,
        }
    }

    pub fn pace(&mut self) {
        let elapsed = self.last.elapsed();
        if elapsed < self.target {
            std::thread::sleep(self.target - elapsed);
        }
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
    }
}
