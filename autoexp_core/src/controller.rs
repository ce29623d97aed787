//! The exposure / white-balance step function and its data types.
//!
//! `step` is the whole algorithm: one metering sample in, updated registers
//! out. It never fails at runtime: config domains are checked once at
//! session build, and degenerate numeric input is floor-clamped so the loop
//! always produces a usable next state.

use autoexp_traits::SensorRegisters;

use crate::error::BuildError;
use crate::metering::{Brightness, MeteringMode, MeteringSample};

/// Floor applied to averages and gains before they are used as divisors.
const DIV_FLOOR: f64 = 0.001;
/// Hardware floor for the shutter register.
const SHUTTER_FLOOR: f64 = 4.0;
/// Hardware floor for the analog gain register.
const ANALOG_GAIN_FLOOR: f64 = 1.0;

/// Tuning parameters, validated once at session build, immutable thereafter.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Which brightness estimate drives the exposure error.
    pub metering_mode: MeteringMode,
    /// Desired normalized brightness (0.0 to 1.0).
    pub target_exposure: f64,
    /// Exposure error damping factor (0.0 to 1.0).
    pub exposure_speed: f64,
    /// Maximum shutter register value (4.0 to 16383.0).
    pub shutter_limit: f64,
    /// Maximum analog gain register value (1.0 to 248.0).
    pub analog_gain_limit: f64,
    /// Maximum per-channel digital gain (0.0 to 1023.0).
    pub rgb_gain_limit: f64,
    /// White-balance blending damping factor (0.0 to 1.0).
    pub white_balance_speed: f64,
    /// Scene-brightness calibration constant (> 0).
    pub brightness_constant: f64,
    /// Scene brightness below which white balance is fully suppressed.
    pub wb_min_activation: f64,
    /// Scene brightness above which white balance runs at full speed.
    pub wb_max_activation: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metering_mode: MeteringMode::Average,
            target_exposure: 0.18,
            exposure_speed: 0.5,
            shutter_limit: 3072.0,
            analog_gain_limit: 16.0,
            rgb_gain_limit: 141.0,
            white_balance_speed: 0.5,
            brightness_constant: 4_166_400.0,
            wb_min_activation: 50.0,
            wb_max_activation: 200.0,
        }
    }
}

impl ControllerConfig {
    /// Domain checks; session build refuses the first violation.
    pub fn validate(&self) -> Result<(), BuildError> {
        if !self.target_exposure.is_finite() || !(0.0..=1.0).contains(&self.target_exposure) {
            return Err(BuildError::InvalidConfig(
                "target_exposure must be in [0.0, 1.0]",
            ));
        }
        if !self.exposure_speed.is_finite() || !(0.0..=1.0).contains(&self.exposure_speed) {
            return Err(BuildError::InvalidConfig(
                "exposure_speed must be in [0.0, 1.0]",
            ));
        }
        if !self.shutter_limit.is_finite() || !(4.0..=16383.0).contains(&self.shutter_limit) {
            return Err(BuildError::InvalidConfig(
                "shutter_limit must be in [4.0, 16383.0]",
            ));
        }
        if !self.analog_gain_limit.is_finite() || !(1.0..=248.0).contains(&self.analog_gain_limit) {
            return Err(BuildError::InvalidConfig(
                "analog_gain_limit must be in [1.0, 248.0]",
            ));
        }
        if !self.rgb_gain_limit.is_finite() || !(0.0..=1023.0).contains(&self.rgb_gain_limit) {
            return Err(BuildError::InvalidConfig(
                "rgb_gain_limit must be in [0.0, 1023.0]",
            ));
        }
        if !self.white_balance_speed.is_finite() || !(0.0..=1.0).contains(&self.white_balance_speed)
        {
            return Err(BuildError::InvalidConfig(
                "white_balance_speed must be in [0.0, 1.0]",
            ));
        }
        if !self.brightness_constant.is_finite() || self.brightness_constant <= 0.0 {
            return Err(BuildError::InvalidConfig(
                "brightness_constant must be > 0",
            ));
        }
        if !self.wb_min_activation.is_finite() || !self.wb_max_activation.is_finite() {
            return Err(BuildError::InvalidConfig(
                "white balance activation thresholds must be finite",
            ));
        }
        if self.wb_min_activation >= self.wb_max_activation {
            return Err(BuildError::InvalidConfig(
                "wb_min_activation must be < wb_max_activation",
            ));
        }
        Ok(())
    }
}

/// Register state threaded through consecutive steps, exclusively owned by
/// the caller. Kept in unrounded float form: the integral values the sensor
/// sees are a presentation concern (`ControllerResult::registers`), and
/// rounding the persisted state would stall slow multiplicative convergence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub shutter: f64,
    pub analog_gain: f64,
    pub red_gain: f64,
    pub green_gain: f64,
    pub blue_gain: f64,
}

impl Default for ControllerState {
    /// Hardware power-on register state.
    fn default() -> Self {
        Self {
            shutter: 1600.0,
            analog_gain: 1.0,
            red_gain: 121.6,
            green_gain: 64.0,
            blue_gain: 140.8,
        }
    }
}

/// Output of one controller step: brightness diagnostics, the exposure error
/// term, and the new register values (duplicating the new state for
/// reporting and logging).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerResult {
    pub brightness: Brightness,
    /// Exposure error term; > 1 means under-exposed relative to target.
    pub error: f64,
    pub shutter: f64,
    pub analog_gain: f64,
    pub red_gain: f64,
    pub green_gain: f64,
    pub blue_gain: f64,
}

impl ControllerResult {
    /// Integral register values for the hardware apply.
    pub fn registers(&self) -> SensorRegisters {
        SensorRegisters {
            shutter: self.shutter.round() as u16,
            analog_gain: self.analog_gain.round() as u16,
            red_gain: self.red_gain.round() as u16,
            green_gain: self.green_gain.round() as u16,
            blue_gain: self.blue_gain.round() as u16,
        }
    }

    /// The persisted state this result mirrors.
    pub fn state(&self) -> ControllerState {
        ControllerState {
            shutter: self.shutter,
            analog_gain: self.analog_gain,
            red_gain: self.red_gain,
            green_gain: self.green_gain,
            blue_gain: self.blue_gain,
        }
    }
}

/// One controller step: pure, total, deterministic.
///
/// `config` must have passed [`ControllerConfig::validate`]; given that,
/// this function cannot fail. Near-zero averages and gains are floor
/// clamped rather than rejected, since a feedback controller must always
/// produce a usable next state.
pub fn step(
    sample: &MeteringSample,
    state: &ControllerState,
    config: &ControllerConfig,
) -> (ControllerResult, ControllerState) {
    // Normalize the sensor brightness readings to 0..1
    let spot_r = f64::from(sample.spot_r) / 255.0;
    let spot_g = f64::from(sample.spot_g) / 255.0;
    let spot_b = f64::from(sample.spot_b) / 255.0;
    let matrix_r = f64::from(sample.matrix_r) / 255.0;
    let matrix_g = f64::from(sample.matrix_g) / 255.0;
    let matrix_b = f64::from(sample.matrix_b) / 255.0;

    let spot_average = ((spot_r + spot_g + spot_b) / 3.0).max(DIV_FLOOR);
    let matrix_average = ((matrix_r + matrix_g + matrix_b) / 3.0).max(DIV_FLOOR);
    let center_weighted_average = ((2.0 * spot_average + matrix_average) / 3.0).max(DIV_FLOOR);

    let driving_average = match config.metering_mode {
        MeteringMode::Spot => spot_average,
        MeteringMode::CenterWeighted => center_weighted_average,
        MeteringMode::Average => matrix_average,
    };

    // error > 1: under-exposed relative to target; error < 1: over-exposed
    let mut error =
        config.exposure_speed * (config.target_exposure / driving_average - 1.0) + 1.0;

    let mut shutter = state.shutter;
    let mut analog_gain = state.analog_gain;

    if error > 1.0 {
        // Brightening: shutter first (less noisy), leftover into analog gain.
        // The leftover is error * old/new, exactly 1 when the shutter
        // absorbed the whole correction without hitting its limit.
        let previous = shutter;
        shutter = (shutter * error).min(config.shutter_limit);
        error *= previous / shutter;

        if error > 1.0 {
            analog_gain = (analog_gain * error).min(config.analog_gain_limit);
        }
    } else {
        // Darkening: analog gain first (faster to settle), leftover into
        // shutter. The gain floor is 1.0; any remainder beyond it goes to
        // the shutter only, never into the RGB gains.
        let previous = analog_gain;
        analog_gain = (analog_gain * error).max(ANALOG_GAIN_FLOOR);
        error *= previous / analog_gain;

        if error < 1.0 {
            shutter = (shutter * error).max(SHUTTER_FLOOR);
        }
    }

    // White balance runs on the full-frame matrix, each channel normalized
    // by its own current gain. Floors guard the divisions on black frames.
    let matrix_r = matrix_r.max(DIV_FLOOR);
    let matrix_g = matrix_g.max(DIV_FLOOR);
    let matrix_b = matrix_b.max(DIV_FLOOR);
    let last_red = state.red_gain.max(DIV_FLOOR);
    let last_green = state.green_gain.max(DIV_FLOOR);
    let last_blue = state.blue_gain.max(DIV_FLOOR);

    let normalized_r = matrix_r / last_red;
    let normalized_g = matrix_g / last_green;
    let normalized_b = matrix_b / last_blue;
    // Brightness target all channels are scaled to match, on the gain scale
    let max_rgb = 256.0 * normalized_r.max(normalized_g).max(normalized_b);

    let target_red = max_rgb / matrix_r * last_red;
    let target_green = max_rgb / matrix_g * last_green;
    let target_blue = max_rgb / matrix_b * last_blue;

    // Absolute brightness estimate, independent of the exposure settings
    // just chosen (unrounded shutter/gain).
    let scene_brightness = config.brightness_constant * matrix_average / (shutter * analog_gain);

    // White balance is suppressed entirely below min activation and applied
    // at full speed above max: color metering is unreliable in very dark or
    // saturated scenes.
    let blending_factor = ((scene_brightness - config.wb_min_activation)
        / (config.wb_max_activation - config.wb_min_activation))
        .clamp(0.0, 1.0);

    let blend = blending_factor * config.white_balance_speed;
    let mut red_gain = last_red + blend * (target_red - last_red);
    let mut green_gain = last_green + blend * (target_green - last_green);
    let mut blue_gain = last_blue + blend * (target_blue - last_blue);

    // Respect the ceiling by scaling all three channels uniformly; clamping
    // channels independently would shift the color balance.
    let max_gain = red_gain.max(green_gain).max(blue_gain);
    if max_gain > config.rgb_gain_limit {
        let scale = config.rgb_gain_limit / max_gain;
        red_gain *= scale;
        green_gain *= scale;
        blue_gain *= scale;
    }

    let brightness = Brightness {
        spot_r,
        spot_g,
        spot_b,
        spot_average,
        matrix_r,
        matrix_g,
        matrix_b,
        matrix_average,
        center_weighted_average,
        scene: scene_brightness,
    };

    let result = ControllerResult {
        brightness,
        error,
        shutter,
        analog_gain,
        red_gain,
        green_gain,
        blue_gain,
    };
    let next = result.state();
    (result, next)
}
