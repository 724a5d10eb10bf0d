//! Single-slot cancellable timeout
//!
//! The session only ever needs "time since the last accepted event", so one
//! re-armable slot replaces a timer queue. Arming cancels whatever was
//! pending before.

use std::time::Duration;

use log::trace;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub struct TimeoutScheduler {
    pending: Option<CancellationToken>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        TimeoutScheduler { pending: None }
    }

    /// Cancel any pending timer and arm a new one-shot timer.
    ///
    /// `on_expire` runs on a runtime worker and receives the timer's own
    /// token. `cancel()` only prevents the closure from being entered while
    /// the timer is still sleeping; an expiry already in flight keeps
    /// running, so the closure must re-check `token.is_cancelled()` under
    /// whatever lock serializes it against the `cancel()` caller before
    /// acting. Panics outside a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, on_expire: F)
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        self.cancel();

        let token = CancellationToken::new();
        let timer_token = token.clone();
        trace!("timeout: armed for {} ms", delay.as_millis());
        tokio::spawn(async move {
            tokio::select! { biased;
                _ = timer_token.cancelled() => {}
                _ = sleep(delay) => {
                    on_expire(timer_token);
                }
            }
        });
        self.pending = Some(token);
    }

    /// Cancel the pending timer if any; safe to call when none is pending.
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            trace!("timeout: cancelled");
            token.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        TimeoutScheduler::new()
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
