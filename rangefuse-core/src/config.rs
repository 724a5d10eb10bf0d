//! Session configuration with fail-fast validation
//!
//! Invalid combinations are rejected when the configuration is built, never
//! discovered mid-session. The constructor is the only way to obtain a
//! [`SessionConfig`], so a held value is always internally consistent.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fusion::FusionStrategy;
use crate::technology::TechnologySet;

/// Fusion pipeline configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Strategy deciding which filtered data reaches the caller
    pub strategy: FusionStrategy,
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig {
            strategy: FusionStrategy::Passthrough,
        }
    }
}

/// Validated per-session options
#[derive(Clone, Debug, Serialize)]
pub struct SessionConfig {
    technologies: TechnologySet,
    fusion: Option<FusionConfig>,
    max_update_interval: Duration,
    init_timeout: Duration,
    no_update_timeout: Duration,
}

impl SessionConfig {
    /// Max wait for the first fused datum before the session gives up
    pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(3);
    /// Max gap between fused data before the session gives up
    pub const DEFAULT_NO_UPDATE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Build a configuration, validating every cross-field invariant.
    ///
    /// `use_fusing` must agree with `fusion.is_some()`; keeping the explicit
    /// flag makes a disagreement between intent and payload a loud error
    /// instead of a silent default.
    pub fn new(
        technologies: TechnologySet,
        use_fusing: bool,
        fusion: Option<FusionConfig>,
        max_update_interval: Duration,
        init_timeout: Duration,
        no_update_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if technologies.is_empty() {
            return Err(ConfigError::NoTechnologies);
        }
        if use_fusing && fusion.is_none() {
            return Err(ConfigError::FusionEnabledWithoutConfig);
        }
        if !use_fusing && fusion.is_some() {
            return Err(ConfigError::FusionConfigWithoutFusing);
        }
        if init_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout { name: "init" });
        }
        if no_update_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout { name: "no-update" });
        }
        Ok(SessionConfig {
            technologies,
            fusion,
            max_update_interval,
            init_timeout,
            no_update_timeout,
        })
    }

    /// Shorthand with default timeouts and immediate delivery.
    pub fn with_defaults(
        technologies: TechnologySet,
        fusion: Option<FusionConfig>,
    ) -> Result<Self, ConfigError> {
        let use_fusing = fusion.is_some();
        SessionConfig::new(
            technologies,
            use_fusing,
            fusion,
            Duration::ZERO,
            Self::DEFAULT_INIT_TIMEOUT,
            Self::DEFAULT_NO_UPDATE_TIMEOUT,
        )
    }

    pub fn technologies(&self) -> TechnologySet {
        self.technologies
    }

    pub fn uses_fusing(&self) -> bool {
        self.fusion.is_some()
    }

    pub fn fusion(&self) -> Option<&FusionConfig> {
        self.fusion.as_ref()
    }

    /// Delivery pacing. Zero means every fused datum is delivered
    /// immediately. Data is currently always delivered immediately; the
    /// configured value is retained for interval-paced delivery.
    pub fn max_update_interval(&self) -> Duration {
        self.max_update_interval
    }

    pub fn init_timeout(&self) -> Duration {
        self.init_timeout
    }

    pub fn no_update_timeout(&self) -> Duration {
        self.no_update_timeout
    }
}
