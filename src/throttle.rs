//! Throttle (C6, §4.6). Per-endpoint sliding-window rate limiting with
//! adaptive backoff on repeated failures, generalized from the source
//! ecosystem's single-endpoint `Arc<RwLock<Instant>>` + semaphore idiom
//! (`IgdbClient::ensure_token`/`query`) into a reusable window keyed by
//! endpoint name.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// One endpoint's sliding-window + backoff state (§4.6), plus the running
/// totals the platform summary artifact reports (§6.5): total time spent
/// waiting, how many rate-exceeded events were seen, and the highest
/// backoff multiplier reached.
struct Window {
    timestamps: VecDeque<Instant>,
    capacity: u32,
    period: Duration,
    consecutive_failures: u32,
    next_allowed: Instant,
    total_wait: Duration,
    rate_exceeded_events: u32,
    max_multiplier_reached: u32,
}

impl Window {
    fn new(capacity: u32, period: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            capacity,
            period,
            consecutive_failures: 0,
            next_allowed: Instant::now(),
            total_wait: Duration::ZERO,
            rate_exceeded_events: 0,
            max_multiplier_reached: 1,
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) >= self.period {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_duration(&mut self, now: Instant) -> Duration {
        self.evict_expired(now);

        let backoff_wait = self.next_allowed.saturating_duration_since(now);
        let window_wait = if self.timestamps.len() >= self.capacity as usize {
            match self.timestamps.front() {
                Some(&front) => self.period.saturating_sub(now.duration_since(front)),
                None => Duration::ZERO,
            }
        } else {
            Duration::ZERO
        };

        backoff_wait.max(window_wait)
    }

    fn record_call(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Backoff multiplier after a retryable failure: `min(2^(c-1), 8)`,
    /// applied to the Provider's `Retry-After` hint if any, else to the
    /// window period itself (§4.6, §8 boundary: 4 consecutive 429s caps
    /// the multiplier at 8x and holds there). The call window is cleared
    /// to be conservative about the next burst.
    fn record_failure(&mut self, retry_after: Option<Duration>, now: Instant) {
        self.consecutive_failures += 1;
        let multiplier = 1u32 << (self.consecutive_failures.saturating_sub(1)).min(3);
        let base = retry_after.unwrap_or(self.period);
        self.next_allowed = now + base * multiplier;
        self.timestamps.clear();
        self.rate_exceeded_events += 1;
        self.max_multiplier_reached = self.max_multiplier_reached.max(multiplier);
    }
}

/// Stats snapshot for one endpoint, surfaced in the platform summary (§6.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottleStats {
    pub total_wait: Duration,
    pub rate_exceeded_events: u32,
    pub max_multiplier_reached: u32,
}

/// Guards one or more named endpoints behind independent sliding windows.
pub struct Throttle {
    windows: Mutex<std::collections::HashMap<String, Window>>,
}

impl Throttle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(std::collections::HashMap::new()),
        })
    }

    /// Register (or overwrite) an endpoint's effective limit — the minimum
    /// of the Provider's reported cap and any operator override (§4.6).
    pub async fn configure(&self, endpoint: &str, capacity: u32, period: Duration) {
        let mut windows = self.windows.lock().await;
        windows.insert(endpoint.to_string(), Window::new(capacity.max(1), period));
    }

    /// Block until `endpoint` has a free slot, then reserve it. A
    /// suspension point per §5 — callers must not hold other locks across it.
    pub async fn acquire(&self, endpoint: &str) {
        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let window = windows
                    .entry(endpoint.to_string())
                    .or_insert_with(|| Window::new(1, Duration::from_secs(1)));
                window.wait_duration(Instant::now())
            };

            if wait.is_zero() {
                let mut windows = self.windows.lock().await;
                if let Some(window) = windows.get_mut(endpoint) {
                    window.record_call(Instant::now());
                }
                return;
            }
            {
                let mut windows = self.windows.lock().await;
                if let Some(window) = windows.get_mut(endpoint) {
                    window.total_wait += wait;
                }
            }
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn report_success(&self, endpoint: &str) {
        let mut windows = self.windows.lock().await;
        if let Some(window) = windows.get_mut(endpoint) {
            window.record_success();
        }
    }

    pub async fn report_failure(&self, endpoint: &str, retry_after: Option<Duration>) {
        let mut windows = self.windows.lock().await;
        if let Some(window) = windows.get_mut(endpoint) {
            window.record_failure(retry_after, Instant::now());
        }
    }

    /// Snapshot this endpoint's running stats for the platform summary
    /// artifact (§6.5). Absent endpoints report a zeroed snapshot.
    pub async fn stats(&self, endpoint: &str) -> ThrottleStats {
        let windows = self.windows.lock().await;
        windows
            .get(endpoint)
            .map(|w| ThrottleStats {
                total_wait: w.total_wait,
                rate_exceeded_events: w.rate_exceeded_events,
                max_multiplier_reached: w.max_multiplier_reached,
            })
            .unwrap_or_default()
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            windows: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_allows_calls_up_to_capacity_without_waiting() {
        let mut w = Window::new(2, Duration::from_secs(60));
        let now = Instant::now();
        assert_eq!(w.wait_duration(now), Duration::ZERO);
        w.record_call(now);
        assert_eq!(w.wait_duration(now), Duration::ZERO);
        w.record_call(now);
        assert!(w.wait_duration(now) > Duration::ZERO);
    }

    #[test]
    fn backoff_multiplier_caps_at_eight_after_four_failures() {
        let mut w = Window::new(10, Duration::from_secs(1));
        let now = Instant::now();
        for _ in 0..4 {
            w.record_failure(None, now);
        }
        let wait = w.next_allowed.saturating_duration_since(now);
        assert_eq!(wait, Duration::from_secs(8));

        // A fifth consecutive failure must not exceed the 8x cap.
        w.record_failure(None, now);
        let wait2 = w.next_allowed.saturating_duration_since(now);
        assert_eq!(wait2, Duration::from_secs(8));
    }

    #[test]
    fn success_resets_consecutive_failure_count() {
        let mut w = Window::new(10, Duration::from_secs(1));
        w.record_failure(None, Instant::now());
        w.record_failure(None, Instant::now());
        w.record_success();
        assert_eq!(w.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn stats_track_rate_exceeded_events_and_max_multiplier() {
        let throttle = Throttle::new();
        throttle.configure("match", 10, Duration::from_secs(1)).await;
        for _ in 0..4 {
            throttle.report_failure("match", Some(Duration::from_millis(1))).await;
        }
        let stats = throttle.stats("match").await;
        assert_eq!(stats.rate_exceeded_events, 4);
        assert_eq!(stats.max_multiplier_reached, 8);

        throttle.report_success("match").await;
        let stats_after_success = throttle.stats("match").await;
        // Success resets the streak but never erases the historical max/count.
        assert_eq!(stats_after_success.max_multiplier_reached, 8);
        assert_eq!(stats_after_success.rate_exceeded_events, 4);
    }

    #[tokio::test]
    async fn unknown_endpoint_reports_zeroed_stats() {
        let throttle = Throttle::new();
        let stats = throttle.stats("never-configured").await;
        assert_eq!(stats.rate_exceeded_events, 0);
        assert_eq!(stats.max_multiplier_reached, 0);
    }
}
