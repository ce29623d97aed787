//! Run a convergence session to completion.

use autoexp_traits::{MeteringSource, RegisterSink, SensorRegisters};

use crate::builder::build_session;
use crate::controller::{ControllerConfig, ControllerState};
use crate::driver::{DriverCfg, SessionStatus, Timeouts};
use crate::error::{ExposureError, Result as CoreResult};

/// Parameters for a single convergence run.
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    pub controller: ControllerConfig,
    pub driver: DriverCfg,
    pub timeouts: Timeouts,
    pub initial: ControllerState,
}

/// Outcome of a settled convergence session.
#[derive(Debug, Clone, Copy)]
pub struct Convergence {
    /// Cycles run before settling.
    pub iterations: u32,
    /// Exposure error of the final cycle.
    pub error: f64,
    /// Integral registers a capture would run with.
    pub registers: SensorRegisters,
    /// Final persisted state; seed a follow-up session with this.
    pub state: ControllerState,
}

/// Run the session until it settles or aborts.
pub fn run<M, R>(
    metering: M,
    sink: R,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    params: RunParams,
) -> CoreResult<Convergence>
where
    M: MeteringSource + 'static,
    R: RegisterSink + 'static,
{
    let RunParams {
        controller,
        driver,
        timeouts,
        initial,
    } = params;
    let max_iterations = driver.max_iterations;

    let mut session = build_session(
        metering,
        sink,
        controller,
        driver,
        timeouts,
        initial,
        cancel_check,
        None,
    )?;
    session.begin();
    tracing::info!(max_iterations, "convergence start");

    loop {
        match session.step()? {
            SessionStatus::Converging => continue,
            SessionStatus::Settled => {
                // A settled session has run at least one cycle.
                let Some(result) = session.last_result() else {
                    return Err(crate::error::Report::new(ExposureError::State(
                        "settled with no cycles run".into(),
                    )));
                };
                let outcome = Convergence {
                    iterations: session.iterations(),
                    error: result.error,
                    registers: result.registers(),
                    state: session.state(),
                };
                tracing::info!(
                    iterations = outcome.iterations,
                    error = outcome.error,
                    "convergence settled"
                );
                return Ok(outcome);
            }
            SessionStatus::Aborted(e) => {
                tracing::error!(error = %e, "convergence aborted");
                return Err(crate::error::Report::new(e));
            }
        }
    }
}
