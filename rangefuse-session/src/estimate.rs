//! Auxiliary estimate source boundary
//!
//! An estimate source (odometry, motion sensors) runs beside the radio
//! adapters: the session starts and stops it, and it pushes
//! [`Estimate`] values through a subscriber. Soft-failure statuses are
//! transient and never terminate the source; a hard failure means the source
//! already stopped itself.

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use rangefuse_core::{Estimate, EstimateStatus};

#[async_trait]
pub trait EstimateSource: Send + Sync {
    /// Begin pushing estimates to `subscriber`. Failures are reported through
    /// the subscriber's status channel, not a return value.
    async fn start(&self, subscriber: Arc<dyn EstimateSubscriber>);

    async fn stop(&self);
}

pub trait EstimateSubscriber: Send + Sync {
    fn on_estimate(&self, estimate: Estimate);
}

/// Session-side subscriber: logs health transitions and retains the latest
/// good estimate for consumers that want to blend it in
pub struct EstimateRelay {
    latest: Mutex<Option<Estimate>>,
    last_status: Mutex<EstimateStatus>,
}

impl EstimateRelay {
    pub fn new() -> Self {
        EstimateRelay {
            latest: Mutex::new(None),
            last_status: Mutex::new(EstimateStatus::EstimateNotAvailable),
        }
    }

    /// Most recent estimate with [`EstimateStatus::Ok`], surviving soft and
    /// hard failures as the last known good value
    pub fn latest(&self) -> Option<Estimate> {
        self.latest.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> EstimateStatus {
        *self.last_status.lock().unwrap()
    }
}

impl Default for EstimateRelay {
    fn default() -> Self {
        EstimateRelay::new()
    }
}

impl EstimateSubscriber for EstimateRelay {
    fn on_estimate(&self, estimate: Estimate) {
        let status = estimate.status;
        let previous = {
            let mut last = self.last_status.lock().unwrap();
            std::mem::replace(&mut *last, status)
        };

        if status.is_hard_failure() {
            error!("estimate: source failed ({})", status);
        } else if status.is_soft_failure() {
            if previous == EstimateStatus::Ok {
                warn!("estimate: degraded ({})", status);
            }
        } else {
            if previous != EstimateStatus::Ok {
                debug!("estimate: healthy again");
            }
            *self.latest.lock().unwrap() = Some(estimate);
        }
    }
}

/// Synthetic odometry source: a slow range wave with a periodic soft-failure
/// sample, driven on a cancellable task like the simulated radio driver
pub struct SimulatedEstimateSource {
    period: Duration,
    base_range_m: f64,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SimulatedEstimateSource {
    pub fn new(period: Duration, base_range_m: f64) -> Self {
        SimulatedEstimateSource {
            period,
            base_range_m,
            cancel: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EstimateSource for SimulatedEstimateSource {
    async fn start(&self, subscriber: Arc<dyn EstimateSubscriber>) {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(token.clone());

        let period = self.period;
        let base_range_m = self.base_range_m;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut index: u32 = 0;
            loop {
                tokio::select! { biased;
                    _ = token.cancelled() => {
                        return;
                    }
                    _ = ticker.tick() => {
                        index += 1;
                        let timestamp = period * index;
                        // Every seventh sample the tracker reports degraded
                        let estimate = if index % 7 == 0 {
                            Estimate::status_only(
                                EstimateStatus::RecoveringFromPoorTracking,
                                timestamp,
                            )
                        } else {
                            let t = period.as_secs_f64() * index as f64;
                            Estimate::ok(base_range_m + 0.2 * (TAU * t / 10.0).sin(), timestamp)
                        };
                        subscriber.on_estimate(estimate);
                    }
                }
            }
        });
    }

    async fn stop(&self) {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
    }
}
