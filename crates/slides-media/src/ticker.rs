//! Playback-speed aware tick scheduling.
//!
//! Faster playback means slides go by faster, so the capture interval is
//! divided by a speed-dependent factor. The interval itself lives in a
//! `watch` channel; the tick loop picks up changes without restarting.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Shortest interval the ticker will ever use.
pub const MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Highest playback speed with its own table entry.
pub const MAX_SPEED: usize = 10;

/// Effective intervals for playback speeds `1..=MAX_SPEED`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalTable {
    base: Duration,
    entries: [Duration; MAX_SPEED],
}

impl IntervalTable {
    pub fn new(base: Duration) -> Self {
        let mut entries = [MIN_INTERVAL; MAX_SPEED];
        for (i, entry) in entries.iter_mut().enumerate() {
            let divisor = 1.0 + 0.5 * i as f64;
            *entry = base.div_f64(divisor).max(MIN_INTERVAL);
        }
        Self { base, entries }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Interval for `speed`, rounded to the nearest table entry.
    pub fn interval_for(&self, speed: f64) -> Duration {
        let idx = if speed.is_finite() {
            speed.round().clamp(1.0, MAX_SPEED as f64) as usize
        } else {
            1
        };
        self.entries[idx - 1]
    }
}

/// Owns the current tick period and publishes changes.
pub struct AdaptiveTicker {
    table: IntervalTable,
    speed: f64,
    period_tx: watch::Sender<Duration>,
}

impl AdaptiveTicker {
    pub fn new(base: Duration) -> Self {
        let table = IntervalTable::new(base);
        let (period_tx, _) = watch::channel(table.interval_for(1.0));
        Self {
            table,
            speed: 1.0,
            period_tx,
        }
    }

    pub fn period(&self) -> Duration {
        *self.period_tx.borrow()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn base(&self) -> Duration {
        self.table.base()
    }

    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.period_tx.subscribe()
    }

    pub fn set_playback_rate(&mut self, speed: f64) {
        self.speed = speed;
        self.publish();
    }

    /// Rebuilds the table only when `base` actually changes.
    pub fn set_base_interval(&mut self, base: Duration) {
        if base == self.table.base() {
            return;
        }
        self.table = IntervalTable::new(base);
        self.publish();
    }

    fn publish(&self) {
        let period = self.table.interval_for(self.speed);
        self.period_tx.send_if_modified(|current| {
            if *current == period {
                return false;
            }
            debug!(period_ms = period.as_millis() as u64, speed = self.speed, "Tick period changed");
            *current = period;
            true
        });
    }
}

fn restart_interval(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Run `on_tick` on every period until `shutdown` flips to true or its sender drops.
///
/// The first tick fires immediately. Ticks never overlap: a slow `on_tick`
/// delays the next one. A tick still running when shutdown arrives is
/// dropped where it stands.
pub async fn run_ticks<F, Fut>(
    mut period_rx: watch::Receiver<Duration>,
    mut shutdown: watch::Receiver<bool>,
    mut on_tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(*period_rx.borrow_and_update());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    _ = on_tick() => {}
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
            }
            changed = period_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                ticker = restart_interval(*period_rx.borrow_and_update());
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_table_values() {
        let table = IntervalTable::new(Duration::from_millis(2000));
        assert_eq!(table.interval_for(1.0), Duration::from_millis(2000));
        assert_eq!(table.interval_for(2.0), Duration::from_millis(2000).div_f64(1.5));
        assert_eq!(table.interval_for(3.0), Duration::from_millis(1000));
        assert_eq!(table.interval_for(10.0), Duration::from_millis(2000).div_f64(5.5));
    }

    #[test]
    fn test_table_floor_and_clamping() {
        let table = IntervalTable::new(Duration::from_millis(500));
        assert_eq!(table.interval_for(10.0), MIN_INTERVAL);
        assert_eq!(table.interval_for(25.0), MIN_INTERVAL);
        assert_eq!(table.interval_for(0.25), Duration::from_millis(500));
        assert_eq!(table.interval_for(f64::NAN), Duration::from_millis(500));
        // 1.4 rounds to 1
        assert_eq!(table.interval_for(1.4), Duration::from_millis(500));
    }

    #[test]
    fn test_ticker_publishes_period_changes() {
        let mut ticker = AdaptiveTicker::new(Duration::from_millis(2000));
        let rx = ticker.subscribe();
        ticker.set_playback_rate(3.0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(ticker.period(), Duration::from_millis(1000));

        ticker.set_base_interval(Duration::from_millis(3000));
        assert_eq!(ticker.period(), Duration::from_millis(1500));
    }

    #[test]
    fn test_same_base_keeps_table() {
        let mut ticker = AdaptiveTicker::new(Duration::from_millis(2000));
        let mut rx = ticker.subscribe();
        rx.borrow_and_update();
        ticker.set_base_interval(Duration::from_millis(2000));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_follows_period_changes() {
        let mut ticker = AdaptiveTicker::new(Duration::from_millis(1000));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let handle = tokio::spawn(run_ticks(ticker.subscribe(), shutdown_rx, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // immediate tick plus one per second
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        ticker.set_playback_rate(10.0);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        // 1000 / 5.5 is about 181ms, floored to 200ms
        assert_eq!(count.load(Ordering::SeqCst), 8);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drops_running_tick() {
        let ticker = AdaptiveTicker::new(Duration::from_millis(1000));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let started = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let (on_start, on_finish) = (started.clone(), finished.clone());
        let handle = tokio::spawn(run_ticks(ticker.subscribe(), shutdown_rx, move || {
            let (on_start, on_finish) = (on_start.clone(), on_finish.clone());
            async move {
                on_start.notify_one();
                std::future::pending::<()>().await;
                on_finish.fetch_add(1, Ordering::SeqCst);
            }
        }));

        started.notified().await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("tick loop should stop while a tick is pending")
            .unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
