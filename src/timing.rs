// Frame-time reporting
//
// Counts frames and produces an average once per reporting interval.

use std::time::{Duration, Instant};

pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Average over one reporting interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frames: u32,
    pub ms_per_frame: f64,
}

impl FrameReport {
    pub fn fps(&self) -> f64 {
        if self.ms_per_frame > 0.0 {
            1000.0 / self.ms_per_frame
        } else {
            0.0
        }
    }
}

pub struct FrameTimer {
    interval_start: Instant,
    frames: u32,
}

impl FrameTimer {
    pub fn new(now: Instant) -> Self {
        Self {
            interval_start: now,
            frames: 0,
        }
    }

    /// Count a finished frame. Returns a report once the interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<FrameReport> {
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < REPORT_INTERVAL {
            return None;
        }

        let report = FrameReport {
            frames: self.frames,
            ms_per_frame: elapsed.as_secs_f64() * 1000.0 / f64::from(self.frames),
        };
        self.frames = 0;
        self.interval_start = now;
        Some(report)
    }
}
