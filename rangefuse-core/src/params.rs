//! Per-session ranging parameters
//!
//! A [`RangingParameters`] bundle names the technologies a session should
//! range with, carrying exactly one technology-specific configuration per
//! technology plus the device role. The configurations are opaque to the
//! session layer; they are handed through to the driver unmodified.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::technology::{RangingTechnology, TechnologySet};

/// Which side of the ranging exchange this device plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Initiates and schedules the ranging rounds
    Controller,
    /// Responds to rounds scheduled by the controller
    Controlee,
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceRole::Controller => "controller",
            DeviceRole::Controlee => "controlee",
        };
        write!(f, "{}", s)
    }
}

/// UWB session knobs, passed through to the UWB driver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UwbConfig {
    /// Driver-scoped session identifier
    pub session_id: u32,
    /// UWB channel number
    pub channel: u8,
    /// Preamble code index for the channel
    pub preamble_index: u8,
    /// Interval between ranging rounds
    pub ranging_interval: Duration,
}

impl Default for UwbConfig {
    fn default() -> Self {
        UwbConfig {
            session_id: 1,
            channel: 9,
            preamble_index: 10,
            ranging_interval: Duration::from_millis(240),
        }
    }
}

/// Channel Sounding knobs, passed through to the CS driver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsConfig {
    /// CS security level (1..=4)
    pub security_level: u8,
    /// Interval between CS procedures
    pub procedure_interval: Duration,
}

impl Default for CsConfig {
    fn default() -> Self {
        CsConfig {
            security_level: 1,
            procedure_interval: Duration::from_millis(500),
        }
    }
}

/// Technology-specific configuration variant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnologyConfig {
    Uwb(UwbConfig),
    Cs(CsConfig),
}

impl TechnologyConfig {
    /// Technology this configuration belongs to
    pub fn technology(&self) -> RangingTechnology {
        match self {
            TechnologyConfig::Uwb(_) => RangingTechnology::Uwb,
            TechnologyConfig::Cs(_) => RangingTechnology::Cs,
        }
    }
}

/// The full parameter bundle handed to `start()`
///
/// Holds one [`TechnologyConfig`] per requested technology. Duplicates are
/// rejected at construction, so a lookup by technology is unambiguous.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangingParameters {
    role: DeviceRole,
    configs: Vec<TechnologyConfig>,
}

impl RangingParameters {
    pub fn new(role: DeviceRole, configs: Vec<TechnologyConfig>) -> Result<Self, ConfigError> {
        let mut seen = TechnologySet::empty();
        for config in &configs {
            let tech = config.technology();
            if seen.has(tech) {
                return Err(ConfigError::DuplicateTechnology(tech));
            }
            seen.add(tech);
        }
        Ok(RangingParameters { role, configs })
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Configuration for one technology, if it was requested
    pub fn config_for(&self, tech: RangingTechnology) -> Option<&TechnologyConfig> {
        self.configs.iter().find(|c| c.technology() == tech)
    }

    /// Technologies named in this bundle
    pub fn technologies(&self) -> TechnologySet {
        self.configs.iter().map(|c| c.technology()).collect()
    }
}
