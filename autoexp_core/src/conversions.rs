//! `From` implementations bridging `autoexp_config` types to `autoexp_core`
//! types.
//!
//! These eliminate manual field-by-field mapping in the CLI.

use crate::controller::{ControllerConfig, ControllerState};
use crate::driver::{DriverCfg, Timeouts};
use crate::metering::MeteringMode;

// ── MeteringMode ─────────────────────────────────────────────────────────────

impl From<autoexp_config::MeteringModeCfg> for MeteringMode {
    fn from(m: autoexp_config::MeteringModeCfg) -> Self {
        match m {
            autoexp_config::MeteringModeCfg::Spot => Self::Spot,
            autoexp_config::MeteringModeCfg::CenterWeighted => Self::CenterWeighted,
            autoexp_config::MeteringModeCfg::Average => Self::Average,
        }
    }
}

// ── ControllerConfig (spans [controller] and [white_balance]) ────────────────

impl From<&autoexp_config::Config> for ControllerConfig {
    fn from(c: &autoexp_config::Config) -> Self {
        Self {
            metering_mode: c.controller.metering.into(),
            target_exposure: c.controller.target_exposure,
            exposure_speed: c.controller.exposure_speed,
            shutter_limit: c.controller.shutter_limit,
            analog_gain_limit: c.controller.analog_gain_limit,
            rgb_gain_limit: c.controller.rgb_gain_limit,
            white_balance_speed: c.white_balance.speed,
            brightness_constant: c.white_balance.brightness_constant,
            wb_min_activation: c.white_balance.min_activation,
            wb_max_activation: c.white_balance.max_activation,
        }
    }
}

// ── DriverCfg ────────────────────────────────────────────────────────────────

impl From<&autoexp_config::DriverCfg> for DriverCfg {
    fn from(c: &autoexp_config::DriverCfg) -> Self {
        Self {
            settle_ms: c.settle_ms,
            max_iterations: c.max_iterations,
            stable_band: c.stable_band,
            stable_iters: c.stable_iters,
            read_retries: c.read_retries,
        }
    }
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

impl From<&autoexp_config::Timeouts> for Timeouts {
    fn from(c: &autoexp_config::Timeouts) -> Self {
        Self {
            metering_ms: c.metering_ms,
        }
    }
}

// ── ControllerState (power-on registers) ─────────────────────────────────────

impl From<&autoexp_config::InitialRegisters> for ControllerState {
    fn from(r: &autoexp_config::InitialRegisters) -> Self {
        Self {
            shutter: r.shutter,
            analog_gain: r.analog_gain,
            red_gain: r.red_gain,
            green_gain: r.green_gain,
            blue_gain: r.blue_gain,
        }
    }
}
