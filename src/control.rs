//! Shared stop/pause signalling for generation jobs.
//!
//! One cancellation token (stop, a one-way latch) and one watch channel
//! (pause, a level that can toggle) are shared by reference across every
//! job in a pool. Jobs check both at the top of each step and inside every
//! wait; no global state is involved.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Read side of the pool-wide stop and pause signals, cloned into each job.
#[derive(Debug, Clone)]
pub struct Controls {
    stop: CancellationToken,
    pause: watch::Receiver<bool>,
}

impl Controls {
    pub fn new(stop: CancellationToken, pause: watch::Receiver<bool>) -> Self {
        Self { stop, pause }
    }

    /// The stop latch has fired. Never resets.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// The pause level is currently set. May toggle on and off repeatedly.
    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Sleep for `duration`, waking early if the stop latch fires or the
    /// pause level changes. Returns `true` if the full duration elapsed.
    pub async fn interruptible_sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.stop.cancelled() => false,
            _ = self.pause.changed() => false,
        }
    }
}

/// Write side of the pool-wide signals, owned by the pool.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    stop: CancellationToken,
    pause: watch::Sender<bool>,
}

impl ControlHandle {
    pub fn new() -> Self {
        let (pause, _) = watch::channel(false);
        Self {
            stop: CancellationToken::new(),
            pause,
        }
    }

    /// A read-side handle for one job.
    pub fn controls(&self) -> Controls {
        Controls::new(self.stop.clone(), self.pause.subscribe())
    }

    pub fn pause(&self) {
        let _ = self.pause.send(true);
    }

    pub fn resume(&self) {
        let _ = self.pause.send(false);
    }

    /// Fire the stop latch. Irreversible.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_is_a_one_way_latch() {
        let handle = ControlHandle::new();
        let controls = handle.controls();
        assert!(!controls.is_stopped());
        handle.stop();
        assert!(controls.is_stopped());
    }

    #[tokio::test]
    async fn pause_is_a_level() {
        let handle = ControlHandle::new();
        let controls = handle.controls();
        assert!(!controls.is_paused());
        handle.pause();
        assert!(controls.is_paused());
        handle.resume();
        assert!(!controls.is_paused());
    }

    #[tokio::test]
    async fn sleep_interrupted_by_stop() {
        let handle = ControlHandle::new();
        let mut controls = handle.controls();
        handle.stop();
        let start = std::time::Instant::now();
        let completed = controls.interruptible_sleep(Duration::from_secs(30)).await;
        assert!(!completed);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sleep_interrupted_by_pause_toggle() {
        let handle = ControlHandle::new();
        let mut controls = handle.controls();
        let sleeper = tokio::spawn(async move {
            let start = std::time::Instant::now();
            let completed = controls.interruptible_sleep(Duration::from_secs(30)).await;
            (completed, start.elapsed())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.pause();
        let (completed, elapsed) = sleeper.await.unwrap();
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
    }
}
