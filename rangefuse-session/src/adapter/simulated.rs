//! Deterministic synthetic ranging driver
//!
//! Produces a repeatable measurement stream without hardware: a base range
//! with linear drift plus a sine-wave disturbance, optional azimuth sweep and
//! a path-loss RSSI. Outcomes can be scripted (refuse to open, stop with a
//! chosen reason after N reports) so session behavior is testable end to end.
//! Used by the demo binary and the integration tests.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use rangefuse_core::{
    AdapterEvents, PeerAddress, RangingParameters, RangingReport, RangingTechnology, StoppedReason,
    TechnologySet,
};

use super::{AdapterError, AdapterFactory, ManagedAdapter, RangingAdapter, RangingDriver};

/// Azimuth sweep half-angle (radians)
const AZIMUTH_SWEEP_RAD: f64 = 0.35;
/// One full azimuth sweep
const AZIMUTH_PERIOD_SECS: f64 = 12.0;
/// Free-space reference signal strength at one meter
const RSSI_AT_ONE_METER_DBM: f64 = -40.0;

/// Scripted behavior of a simulated driver
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DriverScript {
    /// Report until closed
    Run,
    /// Refuse to open
    FailToStart,
    /// Deliver `reports` measurements, then stop with `reason`
    StopAfter {
        reports: u32,
        reason: StoppedReason,
    },
}

/// Synthetic measurement profile for one technology
#[derive(Clone, Debug)]
pub struct SimulatedProfile {
    pub technology: RangingTechnology,
    pub peer: PeerAddress,
    pub update_period: Duration,
    /// Simulated driver engagement latency before `on_started`
    pub start_delay: Duration,
    pub base_range_m: f64,
    /// Linear range drift (meters per second; negative approaches)
    pub drift_mps: f64,
    pub noise_amplitude_m: f64,
    pub noise_period: Duration,
    pub with_azimuth: bool,
    pub with_rssi: bool,
    pub script: DriverScript,
}

impl SimulatedProfile {
    /// Plausible defaults per technology: UWB is fast and clean, Channel
    /// Sounding is slower and noisier.
    pub fn for_technology(technology: RangingTechnology) -> Self {
        match technology {
            RangingTechnology::Uwb => SimulatedProfile {
                technology,
                peer: PeerAddress::new(vec![0xde, 0xca]),
                update_period: Duration::from_millis(240),
                start_delay: Duration::from_millis(50),
                base_range_m: 5.0,
                drift_mps: 0.0,
                noise_amplitude_m: 0.05,
                noise_period: Duration::from_secs(3),
                with_azimuth: true,
                with_rssi: true,
                script: DriverScript::Run,
            },
            RangingTechnology::Cs => SimulatedProfile {
                technology,
                peer: PeerAddress::new(vec![0xc5, 0x01]),
                update_period: Duration::from_millis(500),
                start_delay: Duration::from_millis(80),
                base_range_m: 5.0,
                drift_mps: 0.0,
                noise_amplitude_m: 0.3,
                noise_period: Duration::from_secs(3),
                with_azimuth: false,
                with_rssi: true,
                script: DriverScript::Run,
            },
        }
    }

    /// The report for the n-th tick (1-based), a pure function of the profile
    pub fn report_at(&self, index: u32) -> RangingReport {
        let t = self.update_period.as_secs_f64() * index as f64;
        let noise =
            self.noise_amplitude_m * (TAU * t / self.noise_period.as_secs_f64()).sin();
        let range_m = (self.base_range_m + self.drift_mps * t + noise).max(0.0);

        let mut report = RangingReport::new(
            self.technology,
            self.peer.clone(),
            self.update_period * index,
            range_m,
        );
        if self.with_azimuth {
            report =
                report.with_azimuth(AZIMUTH_SWEEP_RAD * (TAU * t / AZIMUTH_PERIOD_SECS).sin());
        }
        if self.with_rssi {
            report = report.with_rssi(RSSI_AT_ONE_METER_DBM - 20.0 * range_m.max(0.1).log10());
        }
        report
    }
}

/// Driver producing the profile's stream on a cancellable task
pub struct SimulatedDriver {
    profile: SimulatedProfile,
    enabled: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SimulatedDriver {
    pub fn new(profile: SimulatedProfile) -> Self {
        SimulatedDriver {
            profile,
            enabled: AtomicBool::new(true),
            cancel: Mutex::new(None),
        }
    }

    /// Toggle what `is_enabled` reports (simulates the radio being off)
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl RangingDriver for SimulatedDriver {
    fn technology(&self) -> RangingTechnology {
        self.profile.technology
    }

    async fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn open(
        &self,
        _parameters: &RangingParameters,
        events: Arc<dyn AdapterEvents>,
    ) -> Result<(), AdapterError> {
        if self.profile.script == DriverScript::FailToStart {
            return Err(AdapterError::Unavailable {
                technology: self.profile.technology,
                reason: "scripted start failure".into(),
            });
        }

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(token.clone());
        let profile = self.profile.clone();
        tokio::spawn(run_profile(profile, events, token));
        Ok(())
    }

    async fn close(&self) {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
    }
}

async fn run_profile(
    profile: SimulatedProfile,
    events: Arc<dyn AdapterEvents>,
    token: CancellationToken,
) {
    tokio::select! { biased;
        _ = token.cancelled() => {
            events.on_stopped(StoppedReason::Requested);
            return;
        }
        _ = sleep(profile.start_delay) => {}
    }
    events.on_started();
    debug!("{}: simulated driver engaged", profile.technology);

    let mut ticker = interval(profile.update_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut index: u32 = 0;
    loop {
        tokio::select! { biased;
            _ = token.cancelled() => {
                events.on_stopped(StoppedReason::Requested);
                return;
            }
            _ = ticker.tick() => {
                index += 1;
                events.on_ranging_data(profile.report_at(index));
                if let DriverScript::StopAfter { reports, reason } = profile.script {
                    if index >= reports {
                        debug!("{}: scripted stop after {} reports", profile.technology, reports);
                        events.on_stopped(reason);
                        return;
                    }
                }
            }
        }
    }
}

/// Factory handing out simulated adapters for a configurable set of
/// supported technologies
pub struct SimulatedAdapterFactory {
    supported: TechnologySet,
    profiles: HashMap<RangingTechnology, SimulatedProfile>,
}

impl SimulatedAdapterFactory {
    pub fn new(supported: TechnologySet) -> Self {
        SimulatedAdapterFactory {
            supported,
            profiles: HashMap::new(),
        }
    }

    /// Override the default profile for the profile's technology
    pub fn with_profile(mut self, profile: SimulatedProfile) -> Self {
        self.profiles.insert(profile.technology, profile);
        self
    }
}

impl AdapterFactory for SimulatedAdapterFactory {
    fn create(&self, technology: RangingTechnology) -> Option<Arc<dyn RangingAdapter>> {
        if !self.supported.has(technology) {
            return None;
        }
        let profile = self
            .profiles
            .get(&technology)
            .cloned()
            .unwrap_or_else(|| SimulatedProfile::for_technology(technology));
        Some(Arc::new(ManagedAdapter::new(Arc::new(SimulatedDriver::new(
            profile,
        )))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangefuse_core::{DeviceRole, TechnologyConfig, UwbConfig};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recording {
        started: AtomicUsize,
        stopped: Mutex<Vec<StoppedReason>>,
        reports: Mutex<Vec<RangingReport>>,
    }

    impl AdapterEvents for Recording {
        fn on_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_stopped(&self, reason: StoppedReason) {
            self.stopped.lock().unwrap().push(reason);
        }
        fn on_ranging_data(&self, report: RangingReport) {
            self.reports.lock().unwrap().push(report);
        }
    }

    fn parameters() -> RangingParameters {
        RangingParameters::new(
            DeviceRole::Controller,
            vec![TechnologyConfig::Uwb(UwbConfig::default())],
        )
        .unwrap()
    }

    fn fast_profile() -> SimulatedProfile {
        let mut profile = SimulatedProfile::for_technology(RangingTechnology::Uwb);
        profile.update_period = Duration::from_millis(100);
        profile.start_delay = Duration::from_millis(10);
        profile
    }

    #[test]
    fn test_reports_are_deterministic() {
        let profile = fast_profile();
        assert_eq!(profile.report_at(3), profile.report_at(3));
        assert_eq!(profile.report_at(2).timestamp, Duration::from_millis(200));
        assert!(profile.report_at(1).azimuth_rad.is_some());
        assert!(profile.report_at(1).rssi_dbm.is_some());

        let mut drifting = fast_profile();
        drifting.drift_mps = -1.0;
        drifting.noise_amplitude_m = 0.0;
        let early = drifting.report_at(1).range_m;
        let late = drifting.report_at(10).range_m;
        assert!(late < early, "early {} late {}", early, late);
    }

    #[test]
    fn test_range_never_negative() {
        let mut profile = fast_profile();
        profile.base_range_m = 0.1;
        profile.drift_mps = -5.0;
        profile.noise_amplitude_m = 0.0;
        assert_eq!(profile.report_at(100).range_m, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_stream() {
        let driver = SimulatedDriver::new(fast_profile());
        let events = Arc::new(Recording::default());

        driver.open(&parameters(), events.clone()).await.unwrap();
        sleep(Duration::from_millis(350)).await;

        assert_eq!(events.started.load(Ordering::SeqCst), 1);
        let reports = events.reports.lock().unwrap();
        assert!(reports.len() >= 3, "reports: {}", reports.len());
        assert!(reports
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_open_failure() {
        let mut profile = fast_profile();
        profile.script = DriverScript::FailToStart;
        let driver = SimulatedDriver::new(profile);
        let events = Arc::new(Recording::default());

        let err = driver.open(&parameters(), events.clone()).await.unwrap_err();
        assert_eq!(err.stopped_reason(), StoppedReason::FailedToStart);
        assert_eq!(events.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_stop_after_reports() {
        let mut profile = fast_profile();
        profile.script = DriverScript::StopAfter {
            reports: 2,
            reason: StoppedReason::LostConnection,
        };
        let driver = SimulatedDriver::new(profile);
        let events = Arc::new(Recording::default());

        driver.open(&parameters(), events.clone()).await.unwrap();
        sleep(Duration::from_secs(2)).await;

        assert_eq!(events.reports.lock().unwrap().len(), 2);
        assert_eq!(
            events.stopped.lock().unwrap().as_slice(),
            &[StoppedReason::LostConnection]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_confirms_with_requested() {
        let driver = SimulatedDriver::new(fast_profile());
        let events = Arc::new(Recording::default());

        driver.open(&parameters(), events.clone()).await.unwrap();
        sleep(Duration::from_millis(250)).await;
        driver.close().await;
        sleep(Duration::from_millis(50)).await;

        assert_eq!(
            events.stopped.lock().unwrap().as_slice(),
            &[StoppedReason::Requested]
        );
        let count = events.reports.lock().unwrap().len();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(events.reports.lock().unwrap().len(), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_respects_supported_set() {
        let factory = SimulatedAdapterFactory::new(TechnologySet::UWB);
        assert!(factory.create(RangingTechnology::Uwb).is_some());
        assert!(factory.create(RangingTechnology::Cs).is_none());
    }
}
