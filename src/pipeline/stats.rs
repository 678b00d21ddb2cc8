use std::time::Duration;

/// Detector latency accumulated since the processor started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyStats {
    pub num_runs: u64,
    pub total_run_ms: u64,
    pub min_run_ms: u64,
    pub max_run_ms: u64,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            num_runs: 0,
            total_run_ms: 0,
            min_run_ms: u64::MAX,
            max_run_ms: 0,
        }
    }
}

impl LatencyStats {
    pub fn record(&mut self, latency: Duration) -> u64 {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.record_ms(latency_ms);
        latency_ms
    }

    pub fn record_ms(&mut self, latency_ms: u64) {
        self.num_runs += 1;
        self.total_run_ms = self.total_run_ms.saturating_add(latency_ms);
        self.min_run_ms = self.min_run_ms.min(latency_ms);
        self.max_run_ms = self.max_run_ms.max(latency_ms);
    }

    pub fn average_ms(&self) -> Option<f64> {
        (self.num_runs > 0).then(|| self.total_run_ms as f64 / self.num_runs as f64)
    }

    /// `None` until the first run.
    pub fn min_ms(&self) -> Option<u64> {
        (self.num_runs > 0).then_some(self.min_run_ms)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Counts processed frames per interval; the displayed value is the count of
/// the last completed interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FpsCounter {
    frames_in_interval: u32,
    frames_per_second: u32,
}

impl FpsCounter {
    pub fn frame_processed(&mut self) {
        self.frames_in_interval = self.frames_in_interval.saturating_add(1);
    }

    /// Called once per interval boundary.
    pub fn tick(&mut self) {
        self.frames_per_second = self.frames_in_interval;
        self.frames_in_interval = 0;
    }

    pub fn fps(&self) -> u32 {
        self.frames_per_second
    }

    pub fn frames_in_interval(&self) -> u32 {
        self.frames_in_interval
    }
}

/// Copy of the processor's counters, published for readers outside the
/// completion thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub latency: LatencyStats,
    pub fps: u32,
    pub last_latency_ms: Option<u64>,
}
