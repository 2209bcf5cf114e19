//! Progress logging for long batch runs

use std::time::Instant;
use tracing::info;

pub struct Progress {
    label: &'static str,
    total: u64,
    processed: u64,
    every: u64,
    next_report: u64,
    started: Instant,
}

impl Progress {
    pub fn new(label: &'static str, total: u64, every: u64) -> Self {
        let every = every.max(1);
        Self {
            label,
            total,
            processed: 0,
            every,
            next_report: every,
            started: Instant::now(),
        }
    }

    /// Count `n` more items, logging whenever another `every` items passed
    pub fn advance(&mut self, n: u64) -> bool {
        self.processed += n;
        if self.processed < self.next_report {
            return false;
        }
        while self.next_report <= self.processed {
            self.next_report += self.every;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            task = self.label,
            processed = self.processed,
            total = self.total,
            percent = %format!("{:.1}", self.percent()),
            per_second = %format!("{:.1}", self.rate(elapsed)),
            "Progress"
        );
        true
    }

    pub fn finish(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            task = self.label,
            processed = self.processed,
            total = self.total,
            elapsed_secs = %format!("{:.1}", elapsed),
            "Done"
        );
    }

    fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }

    fn rate(&self, elapsed: f64) -> f64 {
        if elapsed > 0.0 {
            self.processed as f64 / elapsed
        } else {
            0.0
        }
    }
}
