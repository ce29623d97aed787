#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and metering-trace parsing for the auto-exposure system.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The metering trace CSV loader enforces exact headers so recorded
//!   sessions can be replayed through the controller offline.
use serde::Deserialize;

/// Metering trace CSV schema.
///
/// Expected headers:
/// spot_r,spot_g,spot_b,matrix_r,matrix_g,matrix_b
///
/// Example:
/// spot_r,spot_g,spot_b,matrix_r,matrix_g,matrix_b
/// 142,139,120,131,128,117
/// 118,116,101,109,107,98
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct MeteringRow {
    pub spot_r: u8,
    pub spot_g: u8,
    pub spot_b: u8,
    pub matrix_r: u8,
    pub matrix_g: u8,
    pub matrix_b: u8,
}

impl MeteringRow {
    /// Channel values in wire order.
    pub fn to_raw(self) -> [u8; 6] {
        [
            self.spot_r,
            self.spot_g,
            self.spot_b,
            self.matrix_r,
            self.matrix_g,
            self.matrix_b,
        ]
    }
}

/// Which brightness estimate drives the exposure error.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeteringModeCfg {
    Spot,
    CenterWeighted,
    #[default]
    Average,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControllerCfg {
    /// Metering mode: "spot", "center_weighted" or "average"
    pub metering: MeteringModeCfg,
    /// Desired normalized brightness (0.0 to 1.0)
    pub target_exposure: f64,
    /// Exposure error damping factor (0.0 to 1.0)
    pub exposure_speed: f64,
    /// Maximum shutter register value (4.0 to 16383.0)
    pub shutter_limit: f64,
    /// Maximum analog gain register value (1.0 to 248.0)
    pub analog_gain_limit: f64,
    /// Maximum per-channel digital gain (0.0 to 1023.0)
    pub rgb_gain_limit: f64,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            metering: MeteringModeCfg::Average,
            target_exposure: 0.18,
            exposure_speed: 0.5,
            shutter_limit: 3072.0,
            analog_gain_limit: 16.0,
            rgb_gain_limit: 141.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WhiteBalanceCfg {
    /// White-balance blending damping factor (0.0 to 1.0)
    pub speed: f64,
    /// Scene-brightness calibration constant (> 0)
    pub brightness_constant: f64,
    /// Scene brightness below which white balance is fully suppressed
    pub min_activation: f64,
    /// Scene brightness above which white balance runs at full speed
    pub max_activation: f64,
}

impl Default for WhiteBalanceCfg {
    fn default() -> Self {
        Self {
            speed: 0.5,
            brightness_constant: 4_166_400.0,
            min_activation: 50.0,
            max_activation: 200.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DriverCfg {
    /// Wait after applying registers before the next metering sample (ms)
    pub settle_ms: u64,
    /// Hard cap on convergence cycles per session
    pub max_iterations: u32,
    /// Consider "in band" if |error - 1| <= stable_band
    pub stable_band: f64,
    /// Consecutive in-band iterations required to settle
    pub stable_iters: u32,
    /// Metering read retries before a transport failure is surfaced
    pub read_retries: u32,
}

impl Default for DriverCfg {
    fn default() -> Self {
        Self {
            settle_ms: 200,
            max_iterations: 30,
            stable_band: 0.05,
            stable_iters: 3,
            read_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Metering query timeout per read (ms). Also accepts alias "sensor_ms".
    #[serde(alias = "sensor_ms")]
    pub metering_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { metering_ms: 1000 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Power-on register state the first convergence cycle starts from.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct InitialRegisters {
    pub shutter: f64,
    pub analog_gain: f64,
    pub red_gain: f64,
    pub green_gain: f64,
    pub blue_gain: f64,
}

impl Default for InitialRegisters {
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerCfg,
    pub white_balance: WhiteBalanceCfg,
    pub driver: DriverCfg,
    pub timeouts: Timeouts,
    pub logging: Logging,
    pub registers: InitialRegisters,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Controller
        let c = &self.controller;
        if !c.target_exposure.is_finite() || !(0.0..=1.0).contains(&c.target_exposure) {
            eyre::bail!("controller.target_exposure must be in [0.0, 1.0]");
        }
        if !c.exposure_speed.is_finite() || !(0.0..=1.0).contains(&c.exposure_speed) {
            eyre::bail!("controller.exposure_speed must be in [0.0, 1.0]");
        }
        if !c.shutter_limit.is_finite() || !(4.0..=16383.0).contains(&c.shutter_limit) {
            eyre::bail!("controller.shutter_limit must be in [4.0, 16383.0]");
        }
        if !c.analog_gain_limit.is_finite() || !(1.0..=248.0).contains(&c.analog_gain_limit) {
            eyre::bail!("controller.analog_gain_limit must be in [1.0, 248.0]");
        }
        if !c.rgb_gain_limit.is_finite() || !(0.0..=1023.0).contains(&c.rgb_gain_limit) {
            eyre::bail!("controller.rgb_gain_limit must be in [0.0, 1023.0]");
        }

        // White balance
        let wb = &self.white_balance;
        if !wb.speed.is_finite() || !(0.0..=1.0).contains(&wb.speed) {
            eyre::bail!("white_balance.speed must be in [0.0, 1.0]");
        }
        if !wb.brightness_constant.is_finite() || wb.brightness_constant <= 0.0 {
            eyre::bail!("white_balance.brightness_constant must be > 0");
        }
        if !wb.min_activation.is_finite() || !wb.max_activation.is_finite() {
            eyre::bail!("white_balance activation thresholds must be finite");
        }
        if wb.min_activation >= wb.max_activation {
            eyre::bail!("white_balance.min_activation must be < max_activation");
        }

        // Driver
        if self.driver.max_iterations == 0 {
            eyre::bail!("driver.max_iterations must be >= 1");
        }
        if self.driver.stable_iters == 0 {
            eyre::bail!("driver.stable_iters must be >= 1");
        }
        if !self.driver.stable_band.is_finite() || self.driver.stable_band < 0.0 {
            eyre::bail!("driver.stable_band must be >= 0");
        }
        if self.driver.settle_ms > 5 * 60 * 1000 {
            eyre::bail!("driver.settle_ms is unreasonably large (>5min)");
        }

        // Timeouts
        if self.timeouts.metering_ms == 0 {
            eyre::bail!("timeouts.metering_ms must be >= 1");
        }

        // Initial registers
        let r = &self.registers;
        if !r.shutter.is_finite() || !(4.0..=16383.0).contains(&r.shutter) {
            eyre::bail!("registers.shutter must be in [4.0, 16383.0]");
        }
        if !r.analog_gain.is_finite() || !(1.0..=248.0).contains(&r.analog_gain) {
            eyre::bail!("registers.analog_gain must be in [1.0, 248.0]");
        }
        for (name, v) in [
            ("registers.red_gain", r.red_gain),
            ("registers.green_gain", r.green_gain),
            ("registers.blue_gain", r.blue_gain),
        ] {
            if !v.is_finite() || !(0.0..=1023.0).contains(&v) {
                eyre::bail!("{name} must be in [0.0, 1023.0]");
            }
        }

        Ok(())
    }
}

pub fn load_metering_csv(path: &std::path::Path) -> eyre::Result<Vec<MeteringRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open metering CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = [
        "spot_r", "spot_g", "spot_b", "matrix_r", "matrix_g", "matrix_b",
    ];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "metering CSV must have headers 'spot_r,spot_g,spot_b,matrix_r,matrix_g,matrix_b', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<MeteringRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    if rows.is_empty() {
        eyre::bail!("metering CSV {:?} contains no data rows", path);
    }

    Ok(rows)
}
