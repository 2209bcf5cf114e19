//! Queue backpressure for batch dispatch
//!
//! Dispatch pauses while the target queue holds more jobs than the
//! configured minimum. The pause length is estimated from how fast the
//! workers drained the queue since the last reading.

use async_trait::async_trait;
use citator_common::queue::Queue;
use citator_common::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Source of the current queue backlog
#[async_trait]
pub trait BacklogSource: Send + Sync {
    async fn backlog(&self) -> Result<u64>;
}

#[async_trait]
impl BacklogSource for Queue {
    async fn backlog(&self) -> Result<u64> {
        self.approximate_depth().await
    }
}

/// How long to pause for a given backlog, if at all.
///
/// `drain_rate` is in jobs per second. Without an estimate the minimum
/// wait is used.
pub fn pause_for(
    backlog: u64,
    min_items: u64,
    drain_rate: Option<f64>,
    min_wait: Duration,
    max_wait: Duration,
) -> Option<Duration> {
    if backlog <= min_items {
        return None;
    }

    let surplus = (backlog - min_items) as f64;
    let wait = match drain_rate {
        Some(rate) if rate > 0.0 => Duration::from_secs_f64(surplus / rate * 1.05),
        _ => min_wait,
    };
    Some(wait.clamp(min_wait, max_wait))
}

#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    /// Backlog at or below which dispatch never waits
    pub min_items: u64,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

/// Dispatch throttle.
///
/// The backlog is read at most once per `2 * min_items` sends; between
/// reads the sender spends credits.
pub struct QueueThrottle {
    source: Arc<dyn BacklogSource>,
    settings: ThrottleSettings,
    credits: u64,
    last_reading: Option<(Instant, u64)>,
    drain_rate: Option<f64>,
}

impl QueueThrottle {
    pub fn new(source: Arc<dyn BacklogSource>, settings: ThrottleSettings) -> Self {
        Self {
            source,
            settings,
            credits: 0,
            last_reading: None,
            drain_rate: None,
        }
    }

    fn max_items(&self) -> u64 {
        self.settings.min_items.saturating_mul(2).max(1)
    }

    /// Block until the backlog allows another send. Returns the last
    /// observed backlog when the queue was last read.
    pub async fn maybe_wait(&mut self) -> Result<Option<u64>> {
        if self.credits > 0 {
            self.credits -= 1;
            return Ok(None);
        }

        loop {
            let backlog = self.source.backlog().await?;
            self.observe(backlog);

            match pause_for(
                backlog,
                self.settings.min_items,
                self.drain_rate,
                self.settings.min_wait,
                self.settings.max_wait,
            ) {
                None => {
                    // Room for this send plus the rest of the headroom
                    self.credits = self.max_items().saturating_sub(backlog).saturating_sub(1);
                    debug!(backlog, credits = self.credits, "Queue has room");
                    return Ok(Some(backlog));
                }
                Some(wait) => {
                    info!(
                        backlog,
                        min_items = self.settings.min_items,
                        wait_secs = wait.as_secs_f64(),
                        "Queue backlog high, pausing dispatch"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn observe(&mut self, backlog: u64) {
        let now = Instant::now();
        if let Some((at, previous)) = self.last_reading {
            let elapsed = now.duration_since(at).as_secs_f64();
            if elapsed > 0.0 && previous > backlog {
                self.drain_rate = Some((previous - backlog) as f64 / elapsed);
            }
        }
        self.last_reading = Some((now, backlog));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedBacklog {
        backlogs: Mutex<VecDeque<u64>>,
        calls: Mutex<usize>,
    }

    impl ScriptedBacklog {
        fn new(backlogs: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                backlogs: Mutex::new(backlogs.iter().copied().collect()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl BacklogSource for ScriptedBacklog {
        async fn backlog(&self) -> Result<u64> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.backlogs.lock().unwrap().pop_front().unwrap_or(0))
        }
    }

    fn settings(min_items: u64) -> ThrottleSettings {
        ThrottleSettings {
            min_items,
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_no_pause_at_or_below_minimum() {
        let wait = Duration::from_secs(5);
        let max = Duration::from_secs(120);
        assert_eq!(pause_for(0, 50, None, wait, max), None);
        assert_eq!(pause_for(50, 50, Some(1.0), wait, max), None);
    }

    #[test]
    fn test_pause_scales_with_drain_rate() {
        let wait = Duration::from_secs(1);
        let max = Duration::from_secs(120);
        // 20 surplus jobs draining at 2/s
        let pause = pause_for(70, 50, Some(2.0), wait, max).unwrap();
        assert_eq!(pause, Duration::from_secs_f64(10.5));
    }

    #[test]
    fn test_pause_is_clamped() {
        let wait = Duration::from_secs(5);
        let max = Duration::from_secs(120);
        assert_eq!(pause_for(51, 50, Some(100.0), wait, max), Some(wait));
        assert_eq!(pause_for(10_000, 50, Some(0.5), wait, max), Some(max));
        assert_eq!(pause_for(60, 50, None, wait, max), Some(wait));
    }

    #[tokio::test]
    async fn test_credits_limit_backlog_reads() {
        let backlog = ScriptedBacklog::new(&[0, 0]);
        let mut throttle = QueueThrottle::new(backlog.clone(), settings(2));

        // Headroom of four sends per read
        assert_eq!(throttle.maybe_wait().await.unwrap(), Some(0));
        for _ in 0..3 {
            assert_eq!(throttle.maybe_wait().await.unwrap(), None);
        }
        assert_eq!(backlog.calls(), 1);

        throttle.maybe_wait().await.unwrap();
        assert_eq!(backlog.calls(), 2);
    }

    #[tokio::test]
    async fn test_waits_until_backlog_drains() {
        let backlog = ScriptedBacklog::new(&[30, 20, 5]);
        let mut throttle = QueueThrottle::new(backlog.clone(), settings(10));

        assert_eq!(throttle.maybe_wait().await.unwrap(), Some(5));
        assert_eq!(backlog.calls(), 3);
        assert!(throttle.drain_rate.is_some());
    }
}
