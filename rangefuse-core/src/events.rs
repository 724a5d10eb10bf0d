//! Callback contracts between drivers, adapters, the session and the caller
//!
//! The session layer is event-driven in both directions: adapters push
//! lifecycle changes and measurements up through [`AdapterEvents`], and the
//! session pushes consolidated notifications out through [`SessionCallback`].
//! Both traits are synchronous; implementations are invoked from whatever
//! task produced the event and must return quickly.

use serde::{Deserialize, Serialize};

use crate::report::{RangingData, RangingReport};
use crate::technology::RangingTechnology;

/// Why an adapter or a session stopped
///
/// One taxonomy serves both scopes: the per-technology variants travel with
/// `EventScope::Technology`, the liveness variants with `EventScope::Session`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedReason {
    /// The caller asked for the stop
    Requested,
    /// Start was attempted without parameters for this technology
    NoParams,
    /// The driver could not be engaged
    FailedToStart,
    /// The peer or radio link went away mid-session
    LostConnection,
    /// The platform revoked the technology (airplane mode, policy)
    SystemPolicy,
    /// No fused datum arrived within the init timeout
    NoInitialDataTimeout,
    /// No fused datum arrived within the no-update timeout
    NoUpdatedDataTimeout,
    /// Unrecoverable internal fault
    InternalError,
    /// Driver-reported failure with no finer classification
    Error,
    Unknown,
}

impl std::fmt::Display for StoppedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StoppedReason::Requested => "requested",
            StoppedReason::NoParams => "no params",
            StoppedReason::FailedToStart => "failed to start",
            StoppedReason::LostConnection => "lost connection",
            StoppedReason::SystemPolicy => "system policy",
            StoppedReason::NoInitialDataTimeout => "no initial data timeout",
            StoppedReason::NoUpdatedDataTimeout => "no updated data timeout",
            StoppedReason::InternalError => "internal error",
            StoppedReason::Error => "error",
            StoppedReason::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Whether a notification concerns the whole session or one technology
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventScope {
    /// The session-wide signal, emitted exactly once per lifecycle edge
    Session,
    /// A per-technology signal; these may interleave across technologies
    Technology(RangingTechnology),
}

impl std::fmt::Display for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventScope::Session => write!(f, "session"),
            EventScope::Technology(tech) => write!(f, "{}", tech),
        }
    }
}

/// Notifications delivered to the session's caller
///
/// Ordering guarantees: `on_started(Session)` fires at most once per start,
/// strictly before the first `on_data`; `on_stopped(Session, _)` fires
/// exactly once per lifecycle, strictly after every per-technology stop, and
/// nothing is delivered after it.
///
/// Callbacks run under the session's state lock. Implementations must not
/// call back into the session from inside a notification; hand the event to
/// another task instead.
pub trait SessionCallback: Send + Sync {
    fn on_started(&self, scope: EventScope);
    fn on_data(&self, data: RangingData);
    fn on_stopped(&self, scope: EventScope, reason: StoppedReason);
}

/// Events one adapter reports to whoever started it
///
/// After a successful `start()` exactly one of `on_started` or `on_stopped`
/// is eventually delivered; after `on_stopped` the adapter is silent.
pub trait AdapterEvents: Send + Sync {
    fn on_started(&self);
    fn on_stopped(&self, reason: StoppedReason);
    fn on_ranging_data(&self, report: RangingReport);
}
