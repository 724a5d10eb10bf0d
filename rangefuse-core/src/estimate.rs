//! Auxiliary estimate types for the odometry boundary
//!
//! An estimate source (motion sensors, odometry) can feed the fusion
//! pipeline alongside radio measurements. Soft-failure states describe a
//! source that is degraded but expected to recover on its own; a hard
//! failure means the source has shut itself down.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Health of an auxiliary estimate source at the moment it reported
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    /// Valid estimate attached
    Ok,
    /// Source is healthy but has nothing to report yet
    EstimateNotAvailable,
    /// Tracking quality dropped, source is re-converging
    RecoveringFromPoorTracking,
    /// Sensor feed was interrupted, source is re-acquiring
    RecoveringFromInterruption,
    /// Source failed and has stopped itself
    FatalSensorFailure,
}

impl EstimateStatus {
    /// Degraded but expected to recover; must not terminate the source
    pub fn is_soft_failure(self) -> bool {
        matches!(
            self,
            EstimateStatus::EstimateNotAvailable
                | EstimateStatus::RecoveringFromPoorTracking
                | EstimateStatus::RecoveringFromInterruption
        )
    }

    /// The source has already stopped itself
    pub fn is_hard_failure(self) -> bool {
        matches!(self, EstimateStatus::FatalSensorFailure)
    }
}

impl fmt::Display for EstimateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EstimateStatus::Ok => "ok",
            EstimateStatus::EstimateNotAvailable => "estimate not available",
            EstimateStatus::RecoveringFromPoorTracking => "recovering from poor tracking",
            EstimateStatus::RecoveringFromInterruption => "recovering from interruption",
            EstimateStatus::FatalSensorFailure => "fatal sensor failure",
        };
        write!(f, "{}", s)
    }
}

/// One report from an auxiliary estimate source
///
/// Measurement fields are only present when `status` is [`EstimateStatus::Ok`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub status: EstimateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth_rad: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_rad: Option<f64>,
    /// Time of the underlying sensor sample
    pub timestamp: Duration,
}

impl Estimate {
    /// A valid estimate carrying at least a range
    pub fn ok(range_m: f64, timestamp: Duration) -> Self {
        Estimate {
            status: EstimateStatus::Ok,
            range_m: Some(range_m),
            azimuth_rad: None,
            elevation_rad: None,
            timestamp,
        }
    }

    /// A status-only report with no measurement attached
    pub fn status_only(status: EstimateStatus, timestamp: Duration) -> Self {
        Estimate {
            status,
            range_m: None,
            azimuth_rad: None,
            elevation_rad: None,
            timestamp,
        }
    }

    pub fn with_azimuth(mut self, azimuth_rad: f64) -> Self {
        self.azimuth_rad = Some(azimuth_rad);
        self
    }

    pub fn with_elevation(mut self, elevation_rad: f64) -> Self {
        self.elevation_rad = Some(elevation_rad);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_hard_classification() {
        assert!(!EstimateStatus::Ok.is_soft_failure());
        assert!(!EstimateStatus::Ok.is_hard_failure());
        assert!(EstimateStatus::EstimateNotAvailable.is_soft_failure());
        assert!(EstimateStatus::RecoveringFromPoorTracking.is_soft_failure());
        assert!(EstimateStatus::RecoveringFromInterruption.is_soft_failure());
        assert!(!EstimateStatus::RecoveringFromInterruption.is_hard_failure());
        assert!(EstimateStatus::FatalSensorFailure.is_hard_failure());
        assert!(!EstimateStatus::FatalSensorFailure.is_soft_failure());
    }

    #[test]
    fn test_status_only_has_no_measurement() {
        let estimate = Estimate::status_only(
            EstimateStatus::EstimateNotAvailable,
            Duration::from_secs(2),
        );
        assert!(estimate.range_m.is_none());
        assert!(estimate.azimuth_rad.is_none());
    }

    #[test]
    fn test_serde_snake_case() {
        let estimate = Estimate::ok(1.5, Duration::from_secs(1)).with_azimuth(0.2);
        let json = serde_json::to_string(&estimate).unwrap();
        assert!(json.contains(r#""status":"ok""#), "json: {}", json);
        assert!(!json.contains("elevation_rad"));

        let status: EstimateStatus =
            serde_json::from_str(r#""recovering_from_poor_tracking""#).unwrap();
        assert_eq!(status, EstimateStatus::RecoveringFromPoorTracking);
    }
}
