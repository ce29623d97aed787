pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Raw metering readout: six uint8 channel values in the fixed order
/// `spot_r, spot_g, spot_b, matrix_r, matrix_g, matrix_b`.
pub type RawMetering = [u8; 6];

/// Integral register values as the sensor accepts them.
///
/// Shutter is in abstract exposure-duration units (4..=16383), analog gain
/// in sensor-stage amplification units (1..=248), and the per-channel RGB
/// gains in digital post-sensor units (0..=1023).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorRegisters {
    pub shutter: u16,
    pub analog_gain: u16,
    pub red_gain: u16,
    pub green_gain: u16,
    pub blue_gain: u16,
}

/// Source of photometric metering samples.
///
/// Each read must reflect sensor state *after* the previously applied
/// registers have settled; pacing that guarantee is the caller's job.
pub trait MeteringSource {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<RawMetering, Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink that applies register values to the sensor.
///
/// Application is fire-and-forget: no acknowledgment is required, only that
/// the write completes before the next metering sample is drawn.
pub trait RegisterSink {
    fn apply(
        &mut self,
        registers: SensorRegisters,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: MeteringSource + ?Sized> MeteringSource for Box<T> {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<RawMetering, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(timeout)
    }
}

impl<T: RegisterSink + ?Sized> RegisterSink for Box<T> {
    fn apply(
        &mut self,
        registers: SensorRegisters,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).apply(registers)
    }
}
