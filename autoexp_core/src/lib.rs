#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core auto-exposure / auto-white-balance logic (transport-agnostic).
//!
//! This crate provides the transport-independent exposure engine. All sensor
//! interactions go through the `autoexp_traits::MeteringSource` and
//! `autoexp_traits::RegisterSink` traits.
//!
//! ## Architecture
//!
//! - **Metering**: sample type, metering modes, brightness breakdown
//!   (`metering` module)
//! - **Controller**: the pure exposure/white-balance step function and its
//!   config/state/result types (`controller` module)
//! - **Driver**: the strictly sequential convergence session: sample, step,
//!   apply, settle (`driver` module, `ExposureSession`)
//! - **Builder/Runner**: session assembly with fail-fast config validation
//!   and a run-to-completion helper (`builder`, `runner` modules)
//!
//! ## Determinism
//!
//! `controller::step` is a pure function over value types: no I/O, no hidden
//! state, IEEE-754 f64 throughout. Identical inputs yield identical outputs,
//! which the session relies on when replaying recorded metering traces.

pub mod builder;
pub mod controller;
pub mod conversions;
pub mod driver;
pub mod error;
pub mod hw_error;
pub mod metering;
pub mod mocks;
pub mod runner;
pub mod util;

pub use builder::{Session, SessionBuilder, build_session};
pub use controller::{ControllerConfig, ControllerResult, ControllerState, step};
pub use driver::{DriverCfg, ExposureSession, SessionStatus, Timeouts};
pub use error::{AbortReason, BuildError, ExposureError};
pub use metering::{Brightness, MeteringMode, MeteringSample};
