//! Adaptive polling interval and the pass timer
//!
//! The interval shrinks quickly while the remote keeps changing and grows
//! slowly while it is quiet, always within `[min, max]`.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Share of the range removed after a pass that saw remote changes
const SPEED_UP_FACTOR: f64 = 0.4;

/// Share of the range added after a quiet pass
const SLOW_DOWN_FACTOR: f64 = 0.2;

/// Polling interval bounded by fixed minimum and maximum
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalController {
    interval_ms: f64,
    min_ms: f64,
    max_ms: f64,
}

impl IntervalController {
    /// Start at the fastest rate
    ///
    /// Bounds given in the wrong order are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let min_ms = min.as_secs_f64() * 1000.0;
        Self {
            interval_ms: min_ms,
            min_ms,
            max_ms: max.as_secs_f64() * 1000.0,
        }
    }

    pub fn min(&self) -> Duration {
        to_duration(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        to_duration(self.max_ms)
    }

    /// `max - min`
    pub fn range_ms(&self) -> f64 {
        self.max_ms - self.min_ms
    }

    /// Current interval in (possibly fractional) milliseconds
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn interval(&self) -> Duration {
        to_duration(self.interval_ms)
    }

    /// Adjust after a completed pass
    pub fn record_pass(&mut self, remote_changed: bool) -> Duration {
        let range = self.range_ms();
        if remote_changed {
            self.interval_ms -= range * SPEED_UP_FACTOR;
        } else {
            self.interval_ms += range * SLOW_DOWN_FACTOR;
        }
        self.interval_ms = self.interval_ms.clamp(self.min_ms, self.max_ms);
        self.interval()
    }

    /// Jump straight to the slowest rate (connectivity lost)
    pub fn force_max(&mut self) -> Duration {
        self.interval_ms = self.max_ms;
        self.interval()
    }
}

fn to_duration(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1000.0).round() as u64)
}

/// Single cancellable scheduled task
///
/// Arming always aborts the previously armed task first, so at most one is
/// ever pending.
#[derive(Debug, Default)]
pub struct PassTimer {
    handle: Option<JoinHandle<()>>,
}

impl PassTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any pending one
    ///
    /// Once the delay elapses the task runs detached: cancelling or re-arming
    /// only ever drops a task that has not started. Must be called from
    /// within a tokio runtime.
    pub fn arm<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(task);
        }));
    }

    /// Abort the pending task, if any; returns whether one was pending
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Whether a task is armed and has not fired yet
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn controller() -> IntervalController {
        IntervalController::new(Duration::from_millis(2_000), Duration::from_millis(15_000))
    }

    #[test]
    fn test_starts_at_min() {
        let c = controller();
        assert_eq!(c.interval(), Duration::from_millis(2_000));
        assert_eq!(c.range_ms(), 13_000.0);
    }

    #[test]
    fn test_quiet_passes_never_exceed_max() {
        let mut c = controller();
        let expected = [4_600.0, 7_200.0, 9_800.0, 12_400.0, 15_000.0, 15_000.0, 15_000.0];
        for want in expected {
            c.record_pass(false);
            assert_eq!(c.interval_ms(), want);
        }
        for _ in 0..20 {
            c.record_pass(false);
            assert!(c.interval() <= c.max());
        }
    }

    #[test]
    fn test_change_decreases_by_forty_percent_of_range() {
        let mut c = controller();
        for _ in 0..10 {
            c.record_pass(false);
        }
        let before = c.interval_ms();
        c.record_pass(true);
        assert_eq!(before - c.interval_ms(), 0.4 * c.range_ms());
        assert_eq!(c.interval(), Duration::from_millis(9_800));
    }

    #[test]
    fn test_change_at_min_stays_at_min() {
        let mut c = controller();
        c.record_pass(true);
        assert_eq!(c.interval(), c.min());
    }

    #[test]
    fn test_force_max() {
        let mut c = controller();
        assert_eq!(c.force_max(), Duration::from_millis(15_000));
        // the next quiet pass stays clamped
        c.record_pass(false);
        assert_eq!(c.interval(), c.max());
    }

    #[test]
    fn test_swapped_bounds() {
        let c = IntervalController::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(c.min(), Duration::from_secs(1));
        assert_eq!(c.max(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timer_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = PassTimer::new();

        let counter = fired.clone();
        timer.arm(Duration::from_millis(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test]
    async fn test_rearming_replaces_pending_task() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = PassTimer::new();

        for _ in 0..3 {
            let counter = fired.clone();
            timer.arm(Duration::from_millis(20), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = PassTimer::new();

        let counter = fired.clone();
        timer.arm(Duration::from_millis(20), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
