//! Rolling-window request limiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Width of the rolling window.
pub const WINDOW: Duration = Duration::from_secs(60);
/// Extra wait added once the window is full.
const SLACK: Duration = Duration::from_millis(100);

/// Allows at most `limit` acquisitions in any 60 second window.
///
/// Waiters are served in arrival order: the lock is held while sleeping, so
/// a later caller cannot overtake one that is already waiting.
pub struct RateLimiter {
    limit: AtomicUsize,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: AtomicUsize::new(limit.max(1)),
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit.max(1), Ordering::Relaxed);
    }

    /// Wait until a request may be sent, then record it.
    pub async fn acquire(&self) {
        let mut timestamps = self.timestamps.lock().await;
        let limit = self.limit();

        prune(&mut timestamps, Instant::now());
        while timestamps.len() >= limit {
            let Some(&oldest) = timestamps.front() else {
                break;
            };
            let wake = oldest + WINDOW + SLACK;
            let wait = wake.saturating_duration_since(Instant::now());
            info!(
                limit,
                wait_ms = wait.as_millis() as u64,
                "Classification rate limit reached, waiting"
            );
            tokio::time::sleep_until(wake).await;
            prune(&mut timestamps, Instant::now());
        }

        timestamps.push_back(Instant::now());
    }

    /// Requests recorded in the current window.
    pub async fn in_window(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        prune(&mut timestamps, Instant::now());
        timestamps.len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&front) = timestamps.front() {
        if now.saturating_duration_since(front) >= WINDOW {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_under_limit_does_not_wait() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_window_waits_for_oldest_to_expire() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire().await;

        limiter.acquire().await;
        let waited = Instant::now() - start;
        assert!(waited >= WINDOW + SLACK);
        assert!(waited < WINDOW + SLACK + Duration::from_millis(10));
        assert_eq!(limiter.in_window().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_served_in_order() {
        let limiter = Arc::new(RateLimiter::new(1));
        limiter.acquire().await;

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for id in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().unwrap().push(id);
            }));
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
