use std::time::{Duration, Instant};

/// Throughput accounting for long reads.
#[derive(Debug, Clone)]
pub struct Stats {
    pub bytes: u64,
    pub requests: u64,
    total: u64,
    t0: Instant,
    last: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            bytes: 0,
            requests: 0,
            total: 0,
            t0: Instant::now(),
            last: Instant::now(),
        }
    }

    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
        self.total += n as u64;
        self.requests += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes per second since the window was last reset.
    pub fn rate(&self) -> f64 {
        let dur = self.t0.elapsed().as_secs_f64().max(1e-3);
        (self.bytes as f64) / dur
    }

    pub fn maybe_log(&mut self, interval: Duration) {
        if self.last.elapsed() >= interval {
            tracing::info!(
                total = self.total,
                window_bytes = self.bytes,
                window_requests = self.requests,
                kbit_per_sec = self.rate() * 8.0 / 1000.0,
                "throughput"
            );
            self.last = Instant::now();
            self.t0 = Instant::now();
            self.bytes = 0;
            self.requests = 0;
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
