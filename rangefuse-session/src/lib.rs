//! # Rangefuse Session
//!
//! The tokio-driven session layer for multi-technology ranging.
//!
//! This crate is the async shell around [`rangefuse_core`]: it owns the
//! technology adapters, the session orchestrator, the liveness timeouts and
//! the estimate-source boundary. The pure data model, state machines and
//! fusion pipeline live in the core crate.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  rangefuse-session (tokio)                                   │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ adapters     │──▶│ session      │──▶│ caller callback  │  │
//! │  │ (drivers +   │   │ orchestrator │   │ (SessionCallback)│  │
//! │  │  state shell)│   │              │◀──│ start / stop     │  │
//! │  └──────────────┘   └──┬────────┬──┘   └──────────────────┘  │
//! │  ┌──────────────┐      │        │                            │
//! │  │ estimate     │──────┘   ┌────▼─────┐                      │
//! │  │ source       │          │ timeout  │                      │
//! │  │ (odometry)   │          │ scheduler│                      │
//! │  └──────────────┘          └──────────┘                      │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ uses
//!                               ▼
//!                  rangefuse-core (fusion, state, data model)
//! ```
//!
//! ## Key Components
//!
//! - [`session::RangingSession`] - The session orchestrator and public API
//! - [`adapter::RangingAdapter`] / [`adapter::RangingDriver`] - The adapter
//!   contract and the driver SPI it decorates
//! - [`adapter::ManagedAdapter`] - State-checking shell around a driver
//! - [`adapter::simulated`] - Deterministic synthetic driver for tests and
//!   the demo binary
//! - [`timeout::TimeoutScheduler`] - Single-slot cancellable liveness timer
//! - [`estimate`] - Auxiliary odometry source boundary
//!
//! ## Example: Running a Simulated Session
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rangefuse_core::{
//!     DeviceRole, EventScope, RangingData, RangingParameters, SessionCallback,
//!     SessionConfig, StoppedReason, TechnologyConfig, TechnologySet, UwbConfig,
//! };
//! use rangefuse_session::adapter::simulated::SimulatedAdapterFactory;
//! use rangefuse_session::session::RangingSession;
//!
//! struct Print;
//! impl SessionCallback for Print {
//!     fn on_started(&self, scope: EventScope) { println!("started: {scope}"); }
//!     fn on_data(&self, data: RangingData) { println!("data at {:?}", data.timestamp()); }
//!     fn on_stopped(&self, scope: EventScope, reason: StoppedReason) {
//!         println!("stopped: {scope} ({reason})");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::with_defaults(TechnologySet::UWB, None).unwrap();
//!     let factory = Arc::new(SimulatedAdapterFactory::new(TechnologySet::UWB));
//!     let session = RangingSession::new(config, factory);
//!
//!     let parameters = RangingParameters::new(
//!         DeviceRole::Controller,
//!         vec![TechnologyConfig::Uwb(UwbConfig::default())],
//!     )
//!     .unwrap();
//!     session.start(&parameters, Arc::new(Print));
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     session.stop(StoppedReason::Requested);
//! }
//! ```

pub mod adapter;
pub mod estimate;
pub mod session;
pub mod timeout;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use adapter::{AdapterFactory, ManagedAdapter, RangingAdapter, RangingDriver};
pub use estimate::{EstimateRelay, EstimateSource, EstimateSubscriber};
pub use session::RangingSession;
pub use timeout::TimeoutScheduler;
