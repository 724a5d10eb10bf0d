//! Error types for session configuration and data construction

use thiserror::Error;

use crate::technology::RangingTechnology;

/// Errors raised while validating a session configuration
///
/// These are all caller mistakes and surface at construction time; nothing
/// here is produced while a session is running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one ranging technology must be configured")]
    NoTechnologies,

    #[error("Fusing enabled but no fusion configuration supplied")]
    FusionEnabledWithoutConfig,

    #[error("Fusion configuration supplied but fusing is disabled")]
    FusionConfigWithoutFusing,

    #[error("{name} timeout must be greater than zero")]
    ZeroTimeout { name: &'static str },

    #[error("Duplicate parameters for technology {0}")]
    DuplicateTechnology(RangingTechnology),
}

/// Errors raised when assembling measurement data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Ranging data must carry at least one report or a fused estimate")]
    Empty,
}
