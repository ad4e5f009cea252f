//! Frame timing and occupancy counters.

use std::time::Duration;

use serde::Serialize;

use crate::resource::CacheStats;

/// Running statistics over a series of durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeStats {
    pub count: u64,
    pub last: Duration,
    pub total: Duration,
    sum_of_squares: f64,
}

impl TimeStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.last = elapsed;
        self.total += elapsed;
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.sum_of_squares += ms * ms;
    }

    /// Mean duration in milliseconds.
    #[must_use]
    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1000.0 / self.count as f64
    }

    /// Standard deviation in milliseconds.
    #[must_use]
    pub fn std_dev_ms(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.average_ms();
        let variance = (self.sum_of_squares - n * mean * mean) / (n - 1.0);
        variance.max(0.0).sqrt()
    }
}

/// Counters kept by the driver and renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameMetrics {
    /// Assembly on the driver thread.
    pub render: TimeStats,
    /// Submission on the GPU thread.
    pub draw: TimeStats,
    /// Redraws deferred because the GPU thread was behind.
    pub backpressured_frames: u64,
    pub picks: u64,
    pub pick_timeouts: u64,
    /// Frames returned to the pool unsubmitted.
    pub discarded_frames: u64,
}

/// A snapshot of the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PipelineMetrics {
    pub frames: FrameMetrics,
    pub queued_redraw_frames: usize,
    pub queued_pick_frames: usize,
    pub live_frames: usize,
    pub pool_capacity: usize,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_stats() {
        let mut stats = TimeStats::default();
        assert!(stats.average_ms().abs() < f64::EPSILON);
        for ms in [2, 4, 4, 4, 5, 5, 7, 9] {
            stats.record(Duration::from_millis(ms));
        }
        assert_eq!(stats.count, 8);
        assert_eq!(stats.last, Duration::from_millis(9));
        assert!((stats.average_ms() - 5.0).abs() < 1e-9);
        // Sample standard deviation of the series above.
        assert!((stats.std_dev_ms() - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }
}
