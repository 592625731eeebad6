//! One-shot cancellable timers backed by the tokio runtime.

use std::time::Duration;

use tokio::task::JoinHandle;

/// A one-shot timer that runs a callback after a delay.
///
/// The timer is cancelled when [`cancel`](Timer::cancel) is called or when
/// the value is dropped, so replacing a timer stored in an `Option` slot
/// implicitly cancels the previous schedule.
///
/// Must be created from within a tokio runtime.
#[derive(Debug)]
pub struct Timer {
    handle: JoinHandle<()>,
}

impl Timer {
    /// Schedule `callback` to run once after `delay`.
    pub fn new(delay: Duration, callback: impl FnOnce() + Send + 'static) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Self { handle }
    }

    /// Cancel the timer. A no-op when the callback already ran.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let _timer = Timer::new(Duration::from_secs(5), move || {
            flag.store(true, Ordering::SeqCst);
        });

        // Let the spawned task register its sleep before the clock moves.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_callback() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = Timer::new(Duration::from_secs(5), move || {
            flag.store(true, Ordering::SeqCst);
        });

        timer.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_the_schedule() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        {
            let _timer = Timer::new(Duration::from_secs(5), move || {
                flag.store(true, Ordering::SeqCst);
            });
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
