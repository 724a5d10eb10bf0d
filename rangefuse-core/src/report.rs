//! Measurement types flowing from adapters to the caller
//!
//! A [`RangingReport`] is one technology's raw measurement. A [`RangingData`]
//! is the unit delivered to the caller: one or more reports, a fused
//! estimate, or both. `RangingData` can never be empty; the constructors
//! enforce that at least one of the two is present.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::technology::{RangingTechnology, TechnologySet};

/// Opaque peer device address
///
/// The byte layout is technology-specific (2 or 8 bytes for UWB short and
/// extended MAC, 6 bytes for a Bluetooth address) and is never interpreted
/// here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress(Vec<u8>);

impl PeerAddress {
    pub fn new(bytes: Vec<u8>) -> Self {
        PeerAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for PeerAddress {
    fn from(bytes: &[u8]) -> Self {
        PeerAddress(bytes.to_vec())
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// One raw measurement from a single technology
///
/// `range_m` and `timestamp` are always present. Angle and signal strength
/// are optional: `None` means the technology did not measure the field, which
/// is different from measuring zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangingReport {
    /// Technology that produced this measurement
    pub technology: RangingTechnology,
    /// Peer device the measurement refers to
    pub peer: PeerAddress,
    /// Measurement time as duration since boot
    pub timestamp: Duration,
    /// Measured distance in meters
    pub range_m: f64,
    /// Angle of arrival, horizontal plane, radians
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth_rad: Option<f64>,
    /// Angle of arrival, vertical plane, radians
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_rad: Option<f64>,
    /// Received signal strength in dBm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi_dbm: Option<f64>,
}

impl RangingReport {
    /// Create a range-only report; optional fields start absent.
    pub fn new(
        technology: RangingTechnology,
        peer: PeerAddress,
        timestamp: Duration,
        range_m: f64,
    ) -> Self {
        RangingReport {
            technology,
            peer,
            timestamp,
            range_m,
            azimuth_rad: None,
            elevation_rad: None,
            rssi_dbm: None,
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

    pub fn with_rssi(mut self, rssi_dbm: f64) -> Self {
        self.rssi_dbm = Some(rssi_dbm);
        self
    }
}

/// Smoothed cross-technology estimate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedEstimate {
    /// Smoothed distance in meters
    pub range_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth_rad: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_rad: Option<f64>,
    /// Technologies that contributed to the estimate
    pub technologies: TechnologySet,
}

/// The unit delivered to the caller
///
/// Carries per-technology reports and/or one fused estimate, plus the
/// timestamp of the newest contribution. At least one of the two parts is
/// always present; use the constructors, the fields are not public.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangingData {
    reports: Vec<RangingReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fused: Option<FusedEstimate>,
    timestamp: Duration,
}

impl RangingData {
    /// Build from a single report; the data timestamp is the report's.
    pub fn from_report(report: RangingReport) -> Self {
        let timestamp = report.timestamp;
        RangingData {
            reports: vec![report],
            fused: None,
            timestamp,
        }
    }

    /// Build from a non-empty report collection.
    pub fn from_reports(reports: Vec<RangingReport>, timestamp: Duration) -> Result<Self, DataError> {
        if reports.is_empty() {
            return Err(DataError::Empty);
        }
        Ok(RangingData {
            reports,
            fused: None,
            timestamp,
        })
    }

    /// Build from a fused estimate alone.
    pub fn from_fused(fused: FusedEstimate, timestamp: Duration) -> Self {
        RangingData {
            reports: Vec::new(),
            fused: Some(fused),
            timestamp,
        }
    }

    /// Attach a fused estimate.
    pub fn with_fused(mut self, fused: FusedEstimate) -> Self {
        self.fused = Some(fused);
        self
    }

    pub fn reports(&self) -> &[RangingReport] {
        &self.reports
    }

    pub fn fused(&self) -> Option<&FusedEstimate> {
        self.fused.as_ref()
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Union of the technologies behind this datum, reports and estimate.
    pub fn technologies(&self) -> TechnologySet {
        let mut set: TechnologySet = self.reports.iter().map(|r| r.technology).collect();
        if let Some(fused) = &self.fused {
            set |= fused.technologies;
        }
        set
    }
}
