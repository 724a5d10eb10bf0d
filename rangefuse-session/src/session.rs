//! Session orchestrator
//!
//! [`RangingSession`] is the component the caller talks to. It owns the
//! adapters map, the fusion engine and the timeout scheduler for the lifetime
//! of one session, and it is driven entirely by its entry points: caller
//! calls (`start`, `stop`), adapter callbacks arriving on driver tasks, and
//! timeout tasks. Every entry point takes the session state lock before
//! inspecting or mutating anything, which is what makes the check-act-notify
//! sequences atomic and keeps a late callback from reviving a stopped
//! session.
//!
//! Lock order is state lock first, then the adapters map or the active
//! session bundle; both secondary locks are [`Guarded`] values that can only
//! be taken through a held state guard, so acquiring them the other way
//! around does not compile. Status queries read the adapters map through a
//! closure-scoped snapshot and never touch the state lock at all.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, trace, warn};

use rangefuse_core::{
    EventScope, FusionEngine, Guarded, RangingParameters, RangingReport, RangingTechnology,
    SessionCallback, SessionConfig, SessionState, StateContainer, StateGuard, StoppedReason,
    TechnologyStatus,
};

use crate::adapter::{AdapterFactory, RangingAdapter};
use crate::estimate::{EstimateRelay, EstimateSource};
use crate::timeout::TimeoutScheduler;

/// Per-session mutable state, reachable only under the state guard
///
/// Created fresh on every `start()` and torn down by `stop()`, so each
/// session begins from a clean slate.
struct SessionActive {
    callback: Option<Arc<dyn SessionCallback>>,
    engine: FusionEngine,
    timeout: TimeoutScheduler,
    relay: Arc<EstimateRelay>,
}

impl Default for SessionActive {
    fn default() -> Self {
        SessionActive {
            callback: None,
            engine: FusionEngine::Passthrough(rangefuse_core::PassthroughEngine::new()),
            timeout: TimeoutScheduler::new(),
            relay: Arc::new(EstimateRelay::new()),
        }
    }
}

struct SessionCore {
    config: SessionConfig,
    factory: Arc<dyn AdapterFactory>,
    state: StateContainer<SessionState>,
    /// Adapters currently wired into this session, keyed by technology
    adapters: Guarded<HashMap<RangingTechnology, Arc<dyn RangingAdapter>>>,
    /// Pre-installed adapters reused across sessions (test/inject hook)
    installed: Guarded<HashMap<RangingTechnology, Arc<dyn RangingAdapter>>>,
    /// Attached odometry source, started alongside the fusion engine
    estimate_source: Guarded<Option<Arc<dyn EstimateSource>>>,
    active: Guarded<SessionActive>,
    /// Self-reference for timeout closures and adapter bridges
    weak: Weak<SessionCore>,
}

impl SessionCore {
    /// Fused-data path: smooth, fuse, and deliver one adapter report.
    ///
    /// Runs entirely under the state lock so the first accepted datum's
    /// `on_started(Session)` lands strictly before its `on_data`, and nothing
    /// is delivered once the stop fence is set.
    fn on_report(&self, report: RangingReport) {
        let mut state = self.state.lock();
        if state.get().is_stopped() {
            debug!("session: dropping {} report, stopped", report.technology);
            return;
        }

        let (data, callback) = {
            let mut active = self.active.lock(&state);
            let Some(data) = active.engine.feed(report) else {
                return;
            };
            // The datum counts as liveness whether or not a callback is set
            active.timeout.cancel();
            (data, active.callback.clone())
        };

        if state.transition(SessionState::Starting, SessionState::Started) {
            info!("session: started on first fused datum");
            if let Some(callback) = &callback {
                callback.on_started(EventScope::Session);
            }
        }
        if let Some(callback) = &callback {
            callback.on_data(data);
        }

        let mut active = self.active.lock(&state);
        self.arm_timeout(
            &mut active.timeout,
            self.config.no_update_timeout(),
            StoppedReason::NoUpdatedDataTimeout,
        );
    }

    /// Arm the single timeout slot with a session-terminating expiry.
    ///
    /// The expiry re-checks its token after taking the state lock: a datum
    /// that arrives while the expiry is in flight cancels the token under
    /// that same lock, so a stale timer never tears down a live session.
    fn arm_timeout(&self, timeout: &mut TimeoutScheduler, delay: Duration, reason: StoppedReason) {
        let weak = self.weak.clone();
        timeout.schedule(delay, move |token| {
            let Some(core) = weak.upgrade() else {
                return;
            };
            let mut state = core.state.lock();
            if token.is_cancelled() {
                debug!("session: stale liveness timer ignored");
                return;
            }
            info!("session: liveness timeout ({})", reason);
            core.stop_locked(&mut state, reason);
        });
    }

    /// Tear the session down and notify the caller, exactly once.
    fn stop(&self, reason: StoppedReason) {
        let mut state = self.state.lock();
        self.stop_locked(&mut state, reason);
    }

    fn stop_locked(&self, state: &mut StateGuard<'_, SessionState>, reason: StoppedReason) {
        if state.get().is_stopped() {
            debug!("session: stop ({}) ignored, already stopped", reason);
            return;
        }
        // Unconditional fence: from here on every other entry point sees
        // Stopped and drops its event before notifying anyone.
        state.set(SessionState::Stopped);
        info!("session: stopping ({})", reason);

        let drained: Vec<(RangingTechnology, Arc<dyn RangingAdapter>)> = {
            let mut adapters = self.adapters.lock(state);
            adapters.drain().collect()
        };
        let (callback, source) = {
            let mut active = self.active.lock(state);
            active.timeout.cancel();
            active.engine.stop();
            let source = self.estimate_source.lock(state).clone();
            (active.callback.take(), source)
        };

        for (technology, adapter) in drained {
            adapter.stop();
            if let Some(callback) = &callback {
                callback.on_stopped(EventScope::Technology(technology), reason);
            }
        }
        if let Some(source) = source {
            tokio::spawn(async move { source.stop().await });
        }
        // The session-wide terminal signal, always last
        if let Some(callback) = callback {
            callback.on_stopped(EventScope::Session, reason);
        }
    }
}

/// Bridges one adapter's events into the session
///
/// Each entry point takes the session state lock first and drops the event if
/// the session has stopped in the meantime.
struct AdapterBridge {
    technology: RangingTechnology,
    adapter: Arc<dyn RangingAdapter>,
    core: Weak<SessionCore>,
}

impl rangefuse_core::AdapterEvents for AdapterBridge {
    fn on_started(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        {
            let state = core.state.lock();
            if state.get().is_live() {
                {
                    let mut active = core.active.lock(&state);
                    active.engine.add_data_source(self.technology);
                }
                let callback = core.active.lock(&state).callback.clone();
                if let Some(callback) = callback {
                    callback.on_started(EventScope::Technology(self.technology));
                }
                return;
            }
        }
        // Started after session teardown: do not leak a running driver
        warn!(
            "session: {} started after stop, stopping orphaned adapter",
            self.technology
        );
        self.adapter.stop();
    }

    fn on_stopped(&self, reason: StoppedReason) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let state = core.state.lock();
        if state.get().is_stopped() {
            debug!(
                "session: {} stopped ({}) after session stop, ignored",
                self.technology, reason
            );
            return;
        }
        {
            let mut adapters = core.adapters.lock(&state);
            adapters.remove(&self.technology);
        }
        {
            let mut active = core.active.lock(&state);
            active.engine.remove_data_source(self.technology);
        }
        info!("session: {} stopped ({})", self.technology, reason);
        let callback = core.active.lock(&state).callback.clone();
        if let Some(callback) = callback {
            callback.on_stopped(EventScope::Technology(self.technology), reason);
        }
    }

    fn on_ranging_data(&self, report: RangingReport) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        trace!(
            "session: {} report range {:.2} m",
            report.technology,
            report.range_m
        );
        core.on_report(report);
    }
}

/// The multi-technology ranging session
///
/// One instance drives one session at a time; after a stop the same instance
/// can be started again from a clean slate. Clones share the same session.
#[derive(Clone)]
pub struct RangingSession {
    core: Arc<SessionCore>,
}

impl RangingSession {
    pub fn new(config: SessionConfig, factory: Arc<dyn AdapterFactory>) -> Self {
        let core = Arc::new_cyclic(|weak| SessionCore {
            config,
            factory,
            state: StateContainer::new(SessionState::Stopped),
            adapters: Guarded::default(),
            installed: Guarded::default(),
            estimate_source: Guarded::new(None),
            active: Guarded::default(),
            weak: weak.clone(),
        });
        RangingSession { core }
    }

    pub fn state(&self) -> SessionState {
        self.core.state.get()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    /// Pre-install an adapter to be reused instead of one built by the
    /// factory. Only consulted while stopped; installing mid-session has no
    /// effect until the next start.
    pub fn install_adapter(&self, adapter: Arc<dyn RangingAdapter>) {
        let technology = adapter.technology();
        let state = self.core.state.lock();
        if state.get().is_live() {
            warn!(
                "session: {} adapter installed mid-session, applies on next start",
                technology
            );
        }
        let mut installed = self.core.installed.lock(&state);
        installed.insert(technology, adapter);
    }

    /// Attach an odometry estimate source, started and stopped alongside the
    /// fusion engine when fusing is enabled.
    pub fn attach_estimate_source(&self, source: Arc<dyn EstimateSource>) {
        let state = self.core.state.lock();
        *self.core.estimate_source.lock(&state) = Some(source);
    }

    /// Latest good odometry estimate from the attached source, if any.
    pub fn latest_estimate(&self) -> Option<rangefuse_core::Estimate> {
        let state = self.core.state.lock();
        let relay = self.core.active.lock(&state).relay.clone();
        drop(state);
        relay.latest()
    }

    /// Start ranging with the technologies named in `parameters`.
    ///
    /// Returns false (with a warning) if the session is already live.
    /// Technologies outside the session configuration or unsupported on this
    /// device are skipped with a warning, never fatal. The session reaches
    /// `Started` on the first accepted fused datum; until then the init
    /// timeout is ticking.
    ///
    /// Must be called from within a tokio runtime: the liveness timer and
    /// the estimate source are spawned onto it.
    pub fn start(&self, parameters: &RangingParameters, callback: Arc<dyn SessionCallback>) -> bool {
        let core = &self.core;
        let mut state = core.state.lock();
        if !state.transition(SessionState::Stopped, SessionState::Starting) {
            warn!("session: start ignored while {}", state.get());
            return false;
        }
        info!(
            "session: starting as {} with {}",
            parameters.role(),
            parameters.technologies()
        );

        let relay = Arc::new(EstimateRelay::new());
        {
            let mut active = core.active.lock(&state);
            let mut engine = FusionEngine::from_config(&core.config);
            engine.start();
            active.engine = engine;
            active.callback = Some(callback);
            active.relay = relay.clone();
        }

        for technology in parameters.technologies().technologies() {
            if !core.config.technologies().has(technology) {
                warn!(
                    "session: {} not in the session configuration, skipped",
                    technology
                );
                continue;
            }
            let installed = core.installed.lock(&state).get(&technology).cloned();
            let adapter = match installed.or_else(|| core.factory.create(technology)) {
                Some(adapter) => adapter,
                None => {
                    warn!("session: {} unsupported on this device, skipped", technology);
                    continue;
                }
            };
            core.adapters
                .lock(&state)
                .insert(technology, adapter.clone());
            let bridge = Arc::new(AdapterBridge {
                technology,
                adapter: adapter.clone(),
                core: core.weak.clone(),
            });
            adapter.start(parameters, bridge);
        }

        if core.config.uses_fusing() {
            if let Some(source) = core.estimate_source.lock(&state).clone() {
                tokio::spawn(async move { source.start(relay).await });
            }
        }

        let mut active = core.active.lock(&state);
        core.arm_timeout(
            &mut active.timeout,
            core.config.init_timeout(),
            StoppedReason::NoInitialDataTimeout,
        );
        true
    }

    /// Stop the session. Idempotent and callable from any task; the second
    /// and later calls are logged no-ops.
    ///
    /// Must be called from within a tokio runtime: estimate-source teardown
    /// is spawned onto it.
    pub fn stop(&self, reason: StoppedReason) {
        self.core.stop(reason);
    }

    /// Availability of every known technology as this session sees it.
    ///
    /// Technologies outside the session configuration report `Unused`;
    /// configured ones report the adapter's `is_enabled` verdict, or
    /// `Disabled` when no adapter exists for them on this device. Runs
    /// without the state lock; the adapters map is read as a snapshot.
    pub async fn technology_status(&self) -> HashMap<RangingTechnology, TechnologyStatus> {
        let core = &self.core;
        let mut status = HashMap::new();
        let mut queries = Vec::new();

        for technology in RangingTechnology::ALL {
            if !core.config.technologies().has(technology) {
                status.insert(technology, TechnologyStatus::Unused);
                continue;
            }
            let adapter = core
                .adapters
                .with(|map| map.get(&technology).cloned())
                .or_else(|| core.installed.with(|map| map.get(&technology).cloned()))
                .or_else(|| core.factory.create(technology));
            match adapter {
                Some(adapter) => queries.push(async move {
                    let enabled = adapter.is_enabled().await;
                    (
                        technology,
                        if enabled {
                            TechnologyStatus::Enabled
                        } else {
                            TechnologyStatus::Disabled
                        },
                    )
                }),
                None => {
                    status.insert(technology, TechnologyStatus::Disabled);
                }
            }
        }

        for (technology, verdict) in join_all(queries).await {
            status.insert(technology, verdict);
        }
        status
    }
}

impl std::fmt::Debug for RangingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RangingSession {{ state: {} }}", self.core.state.get())
    }
}
