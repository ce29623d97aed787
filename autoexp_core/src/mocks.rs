//! Test and helper mocks for autoexp_core

use autoexp_traits::{MeteringSource, RawMetering, RegisterSink, SensorRegisters};

/// A metering source that always errors on read; useful when driving the
/// session with externally supplied samples via `step_from_raw`.
pub struct NoopMetering;

impl MeteringSource for NoopMetering {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<RawMetering, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop metering source")))
    }
}

/// A register sink that accepts and discards every apply; useful for offline
/// trace replay where there is no sensor to update.
pub struct NullSink;

impl RegisterSink for NullSink {
    fn apply(
        &mut self,
        _registers: SensorRegisters,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
