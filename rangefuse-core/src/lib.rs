//! # Rangefuse Core
//!
//! Platform-independent session logic for multi-technology ranging.
//!
//! This crate contains the pure data model, state machines and fusion
//! pipeline with **zero I/O dependencies**. Everything that touches a radio
//! driver, a clock or a task runtime lives in `rangefuse-session`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  rangefuse-core (platform-independent, no tokio/async deps)  │
//! │  ├── technology/  (UWB / Channel Sounding identifiers)       │
//! │  ├── report/      (reports, fused estimates, delivered data) │
//! │  ├── params/      (per-technology ranging parameters)        │
//! │  ├── config/      (validated session configuration)          │
//! │  ├── state/       (session/adapter state containers)         │
//! │  └── fusion/      (filters, fuser strategies, engines)       │
//! └──────────────────────────────────────────────────────────────┘
//!                               ▲
//!                ┌──────────────┴──────────────┐
//!                │  rangefuse-session          │
//!                │  (adapters, orchestrator,   │
//!                │   timeouts, demo binary)    │
//!                └─────────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`technology`] - Technology identifiers, sets and per-technology status
//! - [`report`] - [`RangingReport`], [`FusedEstimate`] and [`RangingData`]
//! - [`params`] - Ranging parameters handed to adapters at start
//! - [`config`] - [`SessionConfig`] with fail-fast cross-field validation
//! - [`state`] - Compare-and-swap state containers and the guarded-lock pair
//! - [`events`] - Caller and adapter callback contracts
//! - [`fusion`] - Kalman smoothing, fuser strategies and the fusion engines
//! - [`estimate`] - Auxiliary odometry estimate types
//!
//! ## Example: Feeding the Fusion Engine
//!
//! ```rust
//! use rangefuse_core::fusion::engine::FilteringFusionEngine;
//! use rangefuse_core::fusion::PassthroughFuser;
//! use rangefuse_core::{PeerAddress, RangingReport, RangingTechnology};
//! use std::time::Duration;
//!
//! let mut engine = FilteringFusionEngine::new(Box::new(PassthroughFuser));
//! engine.start();
//! engine.add_data_source(RangingTechnology::Uwb);
//!
//! let report = RangingReport::new(
//!     RangingTechnology::Uwb,
//!     PeerAddress::new(vec![0x01, 0x02]),
//!     Duration::from_millis(240),
//!     3.2,
//! );
//! let data = engine.feed(report).unwrap();
//! assert!(data.fused().is_some());
//! ```
//!
//! ## Example: Validating a Configuration
//!
//! ```rust
//! use rangefuse_core::{ConfigError, SessionConfig, TechnologySet};
//!
//! let err = SessionConfig::with_defaults(TechnologySet::empty(), None).unwrap_err();
//! assert_eq!(err, ConfigError::NoTechnologies);
//! ```

pub mod config;
pub mod error;
pub mod estimate;
pub mod events;
pub mod fusion;
pub mod params;
pub mod report;
pub mod state;
pub mod technology;

// Re-export commonly used types
pub use config::{FusionConfig, SessionConfig};
pub use error::{ConfigError, DataError};
pub use estimate::{Estimate, EstimateStatus};
pub use events::{AdapterEvents, EventScope, SessionCallback, StoppedReason};
pub use fusion::engine::{FilteringFusionEngine, FusionEngine, PassthroughEngine};
pub use fusion::{DataFuser, FusionStrategy};
pub use params::{CsConfig, DeviceRole, RangingParameters, TechnologyConfig, UwbConfig};
pub use report::{FusedEstimate, PeerAddress, RangingData, RangingReport};
pub use state::{AdapterState, Guarded, SessionState, StateContainer, StateGuard};
pub use technology::{RangingTechnology, TechnologySet, TechnologyStatus};
