//! The convergence session: the strictly sequential loop that meters, steps
//! the controller, applies registers, and waits out the settle window.
//!
//! One cycle = metering sample → `controller::step` → register apply →
//! settle delay. Cycles are never pipelined: the controller's multiplicative
//! update rules assume every sample reflects the currently applied
//! registers, so sample N+1 is only requested after the settle delay that
//! follows the apply of step N. Cancellation is checked at cycle boundaries
//! only, before the next metering query.

use std::sync::Arc;
use std::time::Duration;

use autoexp_traits::clock::Clock;
use autoexp_traits::{MeteringSource, RawMetering, RegisterSink, SensorRegisters};
use eyre::WrapErr;

use crate::controller::{self, ControllerConfig, ControllerResult, ControllerState};
use crate::error::{AbortReason, ExposureError, Result};
use crate::hw_error::map_hw_error;
use crate::metering::MeteringSample;
use crate::util::retry_backoff_ms;

/// Driver pacing and settle policy.
#[derive(Debug, Clone)]
pub struct DriverCfg {
    /// Wait after applying registers before the next sample is trustworthy
    /// (ms). Register changes take up to 200 ms to reach the sensor.
    pub settle_ms: u64,
    /// Hard cap on convergence cycles; the session settles when reached.
    pub max_iterations: u32,
    /// Consider "in band" if `|error - 1| <= stable_band`.
    pub stable_band: f64,
    /// Consecutive in-band iterations required to settle.
    pub stable_iters: u32,
    /// Metering read retries before the failure is surfaced.
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

/// Timeouts and watchdogs.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Max metering wait per read (ms).
    pub metering_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { metering_ms: 1000 }
    }
}

/// Public status of a single cycle of the convergence loop.
#[derive(Debug)]
pub enum SessionStatus {
    /// Keep going; not settled yet.
    Converging,
    /// Error stayed in band (or the iteration cap was reached); the final
    /// registers are applied and a capture can be requested.
    Settled,
    /// Aborted with a typed error; no further cycles will run.
    Aborted(ExposureError),
}

/// Convergence session over a metering source and a register sink.
///
/// Strictly sequential; `step` is synchronous and must not be called
/// concurrently. The threaded `ControllerState` is the only mutable state.
pub struct ExposureSession<M: MeteringSource, R: RegisterSink> {
    pub(crate) metering: M,
    pub(crate) sink: R,
    pub(crate) controller: ControllerConfig,
    pub(crate) driver: DriverCfg,
    pub(crate) timeouts: Timeouts,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) initial: ControllerState,
    pub(crate) state: ControllerState,
    pub(crate) iterations: u32,
    pub(crate) in_band: u32,
    pub(crate) cancel_check: Option<Box<dyn Fn() -> bool>>,
    pub(crate) last_result: Option<ControllerResult>,
}

impl<M: MeteringSource, R: RegisterSink> core::fmt::Debug for ExposureSession<M, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExposureSession")
            .field("iterations", &self.iterations)
            .field("in_band", &self.in_band)
            .field("state", &self.state)
            .finish()
    }
}

impl<M: MeteringSource, R: RegisterSink> ExposureSession<M, R> {
    /// Current persisted controller state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Result of the most recent cycle, if one has run.
    pub fn last_result(&self) -> Option<&ControllerResult> {
        self.last_result.as_ref()
    }

    /// Exposure error of the most recent cycle, if one has run.
    pub fn last_error(&self) -> Option<f64> {
        self.last_result.map(|r| r.error)
    }

    /// Integral registers of the most recent cycle; what a capture request
    /// would run with.
    pub fn final_registers(&self) -> Option<SensorRegisters> {
        self.last_result.map(|r| r.registers())
    }

    /// Cycles run since `begin`.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Reset per-run state back to the initial registers. Call before a new
    /// convergence run.
    pub fn begin(&mut self) {
        self.state = self.initial;
        self.iterations = 0;
        self.in_band = 0;
        self.last_result = None;
    }

    /// One cycle of the convergence loop (reads the metering source
    /// internally, with bounded retries).
    pub fn step(&mut self) -> Result<SessionStatus> {
        if self.cancelled() {
            return Ok(SessionStatus::Aborted(ExposureError::Abort(
                AbortReason::Cancelled,
            )));
        }
        if self.settled() {
            return Ok(SessionStatus::Settled);
        }
        let raw = self.read_metering()?;
        self.run_cycle(MeteringSample::from_raw(raw))
    }

    /// One cycle driven by an externally acquired sample (trace replay,
    /// tests). The metering source is not consulted.
    pub fn step_from_raw(&mut self, raw: RawMetering) -> Result<SessionStatus> {
        if self.cancelled() {
            return Ok(SessionStatus::Aborted(ExposureError::Abort(
                AbortReason::Cancelled,
            )));
        }
        if self.settled() {
            return Ok(SessionStatus::Settled);
        }
        self.run_cycle(MeteringSample::from_raw(raw))
    }

    // ── Private: shared cycle logic ─────────────────────────────────────────

    fn run_cycle(&mut self, sample: MeteringSample) -> Result<SessionStatus> {
        let (result, next) = controller::step(&sample, &self.state, &self.controller);
        self.state = next;

        let registers = result.registers();
        self.sink
            .apply(registers)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("applying registers")?;

        if (result.error - 1.0).abs() <= self.driver.stable_band {
            self.in_band = self.in_band.saturating_add(1);
        } else {
            self.in_band = 0;
        }
        self.iterations = self.iterations.saturating_add(1);

        tracing::trace!(
            iteration = self.iterations,
            error = result.error,
            scene = result.brightness.scene,
            shutter = registers.shutter,
            analog_gain = registers.analog_gain,
            "convergence cycle"
        );
        self.last_result = Some(result);

        // The just-applied registers are not instantaneous on the sensor;
        // wait out the settle window before anything samples again. This
        // also covers the capture taken after the final cycle.
        self.clock
            .sleep(Duration::from_millis(self.driver.settle_ms));

        if self.settled() {
            Ok(SessionStatus::Settled)
        } else {
            Ok(SessionStatus::Converging)
        }
    }

    fn settled(&self) -> bool {
        self.in_band >= self.driver.stable_iters || self.iterations >= self.driver.max_iterations
    }

    fn cancelled(&self) -> bool {
        self.cancel_check.as_ref().is_some_and(|check| check())
    }

    fn read_metering(&mut self) -> Result<RawMetering> {
        let timeout = Duration::from_millis(self.timeouts.metering_ms);
        let mut attempt: u32 = 0;
        loop {
            match self.metering.read(timeout) {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt < self.driver.read_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "metering read failed, retrying");
                    self.clock
                        .sleep(Duration::from_millis(retry_backoff_ms(attempt, 50)));
                }
                Err(e) => {
                    return Err(eyre::Report::new(map_hw_error(&*e)))
                        .wrap_err("reading metering sample");
                }
            }
        }
    }
}
