//! Technology adapter boundary
//!
//! A concrete radio backend implements [`RangingDriver`] and only reports
//! success or failure. [`ManagedAdapter`] decorates a driver with all of the
//! Starting/Started/Stopping bookkeeping: illegal calls become logged no-ops,
//! duplicate driver signals are dropped, and measurements are only forwarded
//! while the adapter is actually started. The session layer talks to
//! [`RangingAdapter`] and never sees a raw driver.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;

use rangefuse_core::{
    AdapterEvents, AdapterState, RangingParameters, RangingTechnology, StateContainer,
    StoppedReason,
};

/// Failure surfaced by a driver while opening
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("missing or invalid parameters for {0}")]
    InvalidParameters(RangingTechnology),
    #[error("{technology} unavailable: {reason}")]
    Unavailable {
        technology: RangingTechnology,
        reason: String,
    },
    #[error("driver fault: {0}")]
    Driver(String),
}

impl AdapterError {
    /// The stop reason delivered to the session for this failure
    pub fn stopped_reason(&self) -> StoppedReason {
        match self {
            AdapterError::InvalidParameters(_) => StoppedReason::NoParams,
            AdapterError::Unavailable { .. } => StoppedReason::FailedToStart,
            AdapterError::Driver(_) => StoppedReason::Error,
        }
    }
}

/// Driver SPI: the unpoliced backend a [`ManagedAdapter`] decorates
///
/// `open` returns once engagement has begun; the driver must eventually call
/// exactly one of `on_started` / `on_stopped` on the events handle it was
/// given, and nothing at all after confirming a close.
#[async_trait]
pub trait RangingDriver: Send + Sync {
    fn technology(&self) -> RangingTechnology;

    /// Whether the radio is currently usable (may require a driver round trip)
    async fn is_enabled(&self) -> bool;

    async fn open(
        &self,
        parameters: &RangingParameters,
        events: Arc<dyn AdapterEvents>,
    ) -> Result<(), AdapterError>;

    async fn close(&self);
}

/// Session-facing adapter contract
///
/// `start` and `stop` are synchronous and non-blocking; driver engagement
/// happens on a spawned task and outcomes arrive through the events handle.
#[async_trait]
pub trait RangingAdapter: Send + Sync {
    fn technology(&self) -> RangingTechnology;

    async fn is_enabled(&self) -> bool;

    fn start(&self, parameters: &RangingParameters, events: Arc<dyn AdapterEvents>);

    fn stop(&self);
}

/// Builds the default adapter for a technology; `None` means the technology
/// is unsupported on this device
pub trait AdapterFactory: Send + Sync {
    fn create(&self, technology: RangingTechnology) -> Option<Arc<dyn RangingAdapter>>;
}

/// State-checking shell around a [`RangingDriver`]
pub struct ManagedAdapter {
    driver: Arc<dyn RangingDriver>,
    state: Arc<StateContainer<AdapterState>>,
}

impl ManagedAdapter {
    pub fn new(driver: Arc<dyn RangingDriver>) -> Self {
        ManagedAdapter {
            driver,
            state: Arc::new(StateContainer::new(AdapterState::Stopped)),
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state.get()
    }
}

#[async_trait]
impl RangingAdapter for ManagedAdapter {
    fn technology(&self) -> RangingTechnology {
        self.driver.technology()
    }

    async fn is_enabled(&self) -> bool {
        self.driver.is_enabled().await
    }

    fn start(&self, parameters: &RangingParameters, events: Arc<dyn AdapterEvents>) {
        let technology = self.driver.technology();
        if !self
            .state
            .transition(AdapterState::Stopped, AdapterState::Starting)
        {
            warn!(
                "{}: start ignored while {}",
                technology,
                self.state.get()
            );
            return;
        }

        let gate: Arc<dyn AdapterEvents> = Arc::new(DriverGate {
            technology,
            state: self.state.clone(),
            events,
        });

        if parameters.config_for(technology).is_none() {
            warn!("{}: no parameters configured", technology);
            // Deliver off-thread like every other outcome; callers may hold
            // locks of their own across start()
            tokio::spawn(async move {
                gate.on_stopped(StoppedReason::NoParams);
            });
            return;
        }

        let driver = self.driver.clone();
        let parameters = parameters.clone();
        tokio::spawn(async move {
            if let Err(e) = driver.open(&parameters, gate.clone()).await {
                warn!("{}: failed to start: {}", technology, e);
                gate.on_stopped(e.stopped_reason());
            }
        });
    }

    fn stop(&self) {
        let technology = self.driver.technology();
        if !self
            .state
            .transition(AdapterState::Started, AdapterState::Stopping)
        {
            warn!(
                "{}: stop ignored while {}",
                technology,
                self.state.get()
            );
            return;
        }

        let driver = self.driver.clone();
        tokio::spawn(async move {
            driver.close().await;
        });
    }
}

/// Gate between raw driver signals and the session listener
///
/// Every signal is checked against the adapter state before forwarding, so
/// exactly one terminal notification reaches the session per start and stale
/// measurements never do.
struct DriverGate {
    technology: RangingTechnology,
    state: Arc<StateContainer<AdapterState>>,
    events: Arc<dyn AdapterEvents>,
}

impl AdapterEvents for DriverGate {
    fn on_started(&self) {
        if self
            .state
            .transition(AdapterState::Starting, AdapterState::Started)
        {
            self.events.on_started();
        } else {
            warn!(
                "{}: driver reported started while {}",
                self.technology,
                self.state.get()
            );
        }
    }

    fn on_stopped(&self, reason: StoppedReason) {
        {
            let mut state = self.state.lock();
            if state.get() == AdapterState::Stopped {
                warn!(
                    "{}: duplicate stop signal ({}) dropped",
                    self.technology, reason
                );
                return;
            }
            state.set(AdapterState::Stopped);
        }
        // Forward outside the state lock; the session side takes its own lock
        self.events.on_stopped(reason);
    }

    fn on_ranging_data(&self, report: rangefuse_core::RangingReport) {
        if self.state.get() == AdapterState::Started {
            self.events.on_ranging_data(report);
        } else {
            debug!(
                "{}: dropping measurement while {}",
                self.technology,
                self.state.get()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangefuse_core::{DeviceRole, RangingReport, TechnologyConfig, UwbConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// How a mock driver behaves when opened
    #[derive(Clone, Copy, PartialEq)]
    enum MockBehavior {
        /// Report started immediately
        StartOk,
        /// Fail the open call
        FailOpen,
        /// Accept the open but never signal; the test fires the gate manually
        Silent,
    }

    struct MockDriver {
        technology: RangingTechnology,
        behavior: MockBehavior,
        opens: AtomicUsize,
        closes: AtomicUsize,
        gate: Mutex<Option<Arc<dyn AdapterEvents>>>,
    }

    impl MockDriver {
        fn new(technology: RangingTechnology, behavior: MockBehavior) -> Arc<Self> {
            Arc::new(MockDriver {
                technology,
                behavior,
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                gate: Mutex::new(None),
            })
        }

        fn gate(&self) -> Arc<dyn AdapterEvents> {
            self.gate.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl RangingDriver for MockDriver {
        fn technology(&self) -> RangingTechnology {
            self.technology
        }

        async fn is_enabled(&self) -> bool {
            true
        }

        async fn open(
            &self,
            _parameters: &RangingParameters,
            events: Arc<dyn AdapterEvents>,
        ) -> Result<(), AdapterError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            *self.gate.lock().unwrap() = Some(events.clone());
            match self.behavior {
                MockBehavior::StartOk => {
                    events.on_started();
                    Ok(())
                }
                MockBehavior::FailOpen => Err(AdapterError::Unavailable {
                    technology: self.technology,
                    reason: "radio off".into(),
                }),
                MockBehavior::Silent => Ok(()),
            }
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            // A real driver confirms asynchronously after teardown
            self.gate().on_stopped(StoppedReason::Requested);
        }
    }

    #[derive(Default)]
    struct RecordingEvents {
        started: AtomicUsize,
        stopped: Mutex<Vec<StoppedReason>>,
        reports: Mutex<Vec<RangingReport>>,
    }

    impl AdapterEvents for RecordingEvents {
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

    fn uwb_parameters() -> RangingParameters {
        RangingParameters::new(
            DeviceRole::Controller,
            vec![TechnologyConfig::Uwb(UwbConfig::default())],
        )
        .unwrap()
    }

    fn report() -> RangingReport {
        RangingReport::new(
            RangingTechnology::Uwb,
            rangefuse_core::PeerAddress::new(vec![0x01]),
            Duration::from_millis(100),
            2.0,
        )
    }

    /// Let spawned driver tasks run to completion
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_start_forwards_started_once() {
        let driver = MockDriver::new(RangingTechnology::Uwb, MockBehavior::StartOk);
        let adapter = ManagedAdapter::new(driver.clone());
        let events = Arc::new(RecordingEvents::default());

        adapter.start(&uwb_parameters(), events.clone());
        settle().await;

        assert_eq!(adapter.state(), AdapterState::Started);
        assert_eq!(driver.opens.load(Ordering::SeqCst), 1);
        assert_eq!(events.started.load(Ordering::SeqCst), 1);

        // Second start while Started is a logged no-op
        adapter.start(&uwb_parameters(), events.clone());
        settle().await;
        assert_eq!(driver.opens.load(Ordering::SeqCst), 1);
        assert_eq!(events.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_without_params_reports_no_params() {
        let driver = MockDriver::new(RangingTechnology::Cs, MockBehavior::StartOk);
        let adapter = ManagedAdapter::new(driver.clone());
        let events = Arc::new(RecordingEvents::default());

        // Parameters only carry UWB, the adapter ranges CS
        adapter.start(&uwb_parameters(), events.clone());
        settle().await;

        assert_eq!(adapter.state(), AdapterState::Stopped);
        assert_eq!(driver.opens.load(Ordering::SeqCst), 0);
        assert_eq!(
            events.stopped.lock().unwrap().as_slice(),
            &[StoppedReason::NoParams]
        );
    }

    #[tokio::test]
    async fn test_failed_open_reports_failed_to_start() {
        let driver = MockDriver::new(RangingTechnology::Uwb, MockBehavior::FailOpen);
        let adapter = ManagedAdapter::new(driver);
        let events = Arc::new(RecordingEvents::default());

        adapter.start(&uwb_parameters(), events.clone());
        settle().await;

        assert_eq!(adapter.state(), AdapterState::Stopped);
        assert_eq!(events.started.load(Ordering::SeqCst), 0);
        assert_eq!(
            events.stopped.lock().unwrap().as_slice(),
            &[StoppedReason::FailedToStart]
        );
    }

    #[tokio::test]
    async fn test_stop_round_trip() {
        let driver = MockDriver::new(RangingTechnology::Uwb, MockBehavior::StartOk);
        let adapter = ManagedAdapter::new(driver.clone());
        let events = Arc::new(RecordingEvents::default());

        adapter.start(&uwb_parameters(), events.clone());
        settle().await;
        adapter.stop();
        settle().await;

        assert_eq!(driver.closes.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.state(), AdapterState::Stopped);
        assert_eq!(
            events.stopped.lock().unwrap().as_slice(),
            &[StoppedReason::Requested]
        );
    }

    #[tokio::test]
    async fn test_stop_before_started_ignored() {
        let driver = MockDriver::new(RangingTechnology::Uwb, MockBehavior::Silent);
        let adapter = ManagedAdapter::new(driver.clone());
        let events = Arc::new(RecordingEvents::default());

        adapter.start(&uwb_parameters(), events.clone());
        settle().await;
        assert_eq!(adapter.state(), AdapterState::Starting);

        adapter.stop();
        settle().await;
        assert_eq!(adapter.state(), AdapterState::Starting);
        assert_eq!(driver.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_measurements_gated_by_state() {
        let driver = MockDriver::new(RangingTechnology::Uwb, MockBehavior::Silent);
        let adapter = ManagedAdapter::new(driver.clone());
        let events = Arc::new(RecordingEvents::default());

        adapter.start(&uwb_parameters(), events.clone());
        settle().await;

        // Still Starting: measurement dropped
        driver.gate().on_ranging_data(report());
        assert!(events.reports.lock().unwrap().is_empty());

        driver.gate().on_started();
        driver.gate().on_ranging_data(report());
        assert_eq!(events.reports.lock().unwrap().len(), 1);

        // After the terminal signal nothing is forwarded
        driver.gate().on_stopped(StoppedReason::LostConnection);
        driver.gate().on_ranging_data(report());
        assert_eq!(events.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_terminal_signals_dropped() {
        let driver = MockDriver::new(RangingTechnology::Uwb, MockBehavior::Silent);
        let adapter = ManagedAdapter::new(driver.clone());
        let events = Arc::new(RecordingEvents::default());

        adapter.start(&uwb_parameters(), events.clone());
        settle().await;

        driver.gate().on_started();
        driver.gate().on_stopped(StoppedReason::LostConnection);
        driver.gate().on_stopped(StoppedReason::Error);
        driver.gate().on_started();

        assert_eq!(events.started.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.stopped.lock().unwrap().as_slice(),
            &[StoppedReason::LostConnection]
        );
        assert_eq!(adapter.state(), AdapterState::Stopped);
    }

    #[test]
    fn test_error_reason_mapping() {
        assert_eq!(
            AdapterError::InvalidParameters(RangingTechnology::Uwb).stopped_reason(),
            StoppedReason::NoParams
        );
        assert_eq!(
            AdapterError::Unavailable {
                technology: RangingTechnology::Cs,
                reason: "off".into()
            }
            .stopped_reason(),
            StoppedReason::FailedToStart
        );
        assert_eq!(
            AdapterError::Driver("bus".into()).stopped_reason(),
            StoppedReason::Error
        );
    }
}
