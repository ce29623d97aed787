//! Metering sample types and the brightness breakdown.

use autoexp_traits::RawMetering;

/// Which brightness estimate drives the exposure error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeteringMode {
    /// Center-spot average only.
    Spot,
    /// Spot-weighted blend: `(2*spot + matrix) / 3`.
    CenterWeighted,
    /// Full-frame matrix average.
    #[default]
    Average,
}

/// One photometric metering sample: six channel readings in [0, 255].
///
/// `spot_*` meters the center-spot region, `matrix_*` the full frame.
/// Out-of-range or non-finite readings are unrepresentable here; a transport
/// that produces anything else must reject it before constructing a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeteringSample {
    pub spot_r: u8,
    pub spot_g: u8,
    pub spot_b: u8,
    pub matrix_r: u8,
    pub matrix_g: u8,
    pub matrix_b: u8,
}

impl MeteringSample {
    /// Build a sample from the wire-order sextuple a `MeteringSource` yields.
    pub fn from_raw(raw: RawMetering) -> Self {
        let [spot_r, spot_g, spot_b, matrix_r, matrix_g, matrix_b] = raw;
        Self {
            spot_r,
            spot_g,
            spot_b,
            matrix_r,
            matrix_g,
            matrix_b,
        }
    }
}

impl From<RawMetering> for MeteringSample {
    fn from(raw: RawMetering) -> Self {
        Self::from_raw(raw)
    }
}

/// Normalized brightness breakdown reported by a controller step.
///
/// Channel values are in 0..1 (readings divided by 255); averages carry the
/// divide-by-zero floor, matrix channels likewise (they feed the white
/// balance divisions). `scene` is the calibration-scaled absolute estimate,
/// independent of the current exposure settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brightness {
    pub spot_r: f64,
    pub spot_g: f64,
    pub spot_b: f64,
    pub spot_average: f64,
    pub matrix_r: f64,
    pub matrix_g: f64,
    pub matrix_b: f64,
    pub matrix_average: f64,
    pub center_weighted_average: f64,
    pub scene: f64,
}
