use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Default pause between celebration feedback and the next activity.
pub const DEFAULT_ADVANCE_DELAY: Duration = Duration::from_millis(1500);

/// A cancellable delayed transition.
///
/// Exactly one of "fire" and "cancel" wins. Once [`AdvanceTimer::cancel`]
/// returns `true`, or the timer is dropped before firing, the callback never runs.
#[derive(Debug)]
pub struct AdvanceTimer {
    settled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AdvanceTimer {
    /// Run `on_fire` after `delay` on the current tokio runtime.
    pub fn schedule<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let settled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&settled);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.swap(true, Ordering::AcqRel) {
                on_fire();
            }
        });
        Self { settled, task }
    }

    /// Cancel the pending transition. Returns `false` if it already fired.
    pub fn cancel(&self) -> bool {
        let won = !self.settled.swap(true, Ordering::AcqRel);
        self.task.abort();
        if won {
            tracing::debug!("advance timer cancelled");
        }
        won
    }

    /// Neither fired nor cancelled yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.settled.load(Ordering::Acquire)
    }
}

impl Drop for AdvanceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let timer = AdvanceTimer::schedule(DEFAULT_ADVANCE_DELAY, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(DEFAULT_ADVANCE_DELAY + Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let timer = AdvanceTimer::schedule(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        drop(AdvanceTimer::schedule(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
