// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Frame-time average used for the window title.
///
/// The first frame seeds the average; later frames blend in with weight `ALPHA`.
#[derive(Debug)]
pub struct FpsCounter {
    frame_count: u64,
    average_duration: f32,
    fps: u32,
    last_tick: Instant,
}

impl FpsCounter {
    const ALPHA: f32 = 1.0 / 100.0;

    pub fn new() -> Self {
        Self {
            frame_count: 0,
            average_duration: 0.0,
            fps: 0,
            last_tick: Instant::now(),
        }
    }

    /// Seconds since the previous call (or since construction).
    pub fn delta_time(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick);
        self.last_tick = now;
        dt.as_secs_f32()
    }

    pub fn record(&mut self, delta_time: f32) {
        self.frame_count += 1;
        if self.frame_count == 1 {
            self.average_duration = delta_time;
        } else {
            self.average_duration =
                self.average_duration * (1.0 - Self::ALPHA) + delta_time * Self::ALPHA;
        }
        self.fps = if self.average_duration > 0.0 {
            (1.0 / self.average_duration) as u32
        } else {
            0
        };
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn average_frame_time(&self) -> Duration {
        Duration::from_secs_f32(self.average_duration.max(0.0))
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_seeds_the_average() {
        let mut c = FpsCounter::new();
        c.record(0.02);
        assert_eq!(c.fps(), 50);
        assert_eq!(c.frame_count(), 1);
    }

    #[test]
    fn later_frames_move_the_average_slowly() {
        let mut c = FpsCounter::new();
        c.record(0.01);
        c.record(1.0);
        // 0.01 * 0.99 + 1.0 * 0.01 = 0.0199
        assert_eq!(c.fps(), 50);
    }

    #[test]
    fn zero_duration_does_not_divide_by_zero() {
        let mut c = FpsCounter::new();
        c.record(0.0);
        assert_eq!(c.fps(), 0);
    }
}
