//! Session assembly with fail-fast validation.
//!
//! `SessionBuilder` is type-state: `build()` only exists once a metering
//! source and a register sink have been provided, so a half-wired session is
//! a compile error rather than a runtime surprise. `try_build()` stays
//! available in any state and reports missing pieces as typed errors.

use std::marker::PhantomData;
use std::sync::Arc;

use autoexp_traits::clock::{Clock, MonotonicClock};
use autoexp_traits::{MeteringSource, RegisterSink};

use crate::controller::{ControllerConfig, ControllerState};
use crate::driver::{DriverCfg, ExposureSession, Timeouts};
use crate::error::{BuildError, Result};

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Dynamic (boxed) session built by [`SessionBuilder`].
pub type Session = ExposureSession<Box<dyn MeteringSource>, Box<dyn RegisterSink>>;

impl Session {
    /// Start building a session.
    pub fn builder() -> SessionBuilder<Missing, Missing> {
        SessionBuilder::default()
    }
}

/// Builder for [`Session`]. All configs are validated on build.
pub struct SessionBuilder<M, R> {
    metering: Option<Box<dyn MeteringSource>>,
    sink: Option<Box<dyn RegisterSink>>,
    controller: Option<ControllerConfig>,
    driver: Option<DriverCfg>,
    timeouts: Option<Timeouts>,
    initial: Option<ControllerState>,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _m: PhantomData<M>,
    _r: PhantomData<R>,
}

impl Default for SessionBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            metering: None,
            sink: None,
            controller: None,
            driver: None,
            timeouts: None,
            initial: None,
            cancel_check: None,
            clock: None,
            _m: PhantomData,
            _r: PhantomData,
        }
    }
}

impl<M, R> SessionBuilder<M, R> {
    /// Fallible build available in any type-state; returns detailed
    /// `BuildError` for missing pieces.
    pub fn try_build(self) -> Result<Session> {
        let SessionBuilder {
            metering,
            sink,
            controller,
            driver,
            timeouts,
            initial,
            cancel_check,
            clock,
            _m: _,
            _r: _,
        } = self;

        let metering =
            metering.ok_or_else(|| eyre::Report::new(BuildError::MissingMeteringSource))?;
        let sink = sink.ok_or_else(|| eyre::Report::new(BuildError::MissingRegisterSink))?;

        let controller = controller.unwrap_or_default();
        let driver = driver.unwrap_or_default();
        let timeouts = timeouts.unwrap_or_default();
        let initial = initial.unwrap_or_default();

        validate(&controller, &driver, &timeouts, &initial)?;

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        Ok(ExposureSession {
            metering,
            sink,
            controller,
            driver,
            timeouts,
            clock,
            initial,
            state: initial,
            iterations: 0,
            in_band: 0,
            cancel_check,
            last_result: None,
        })
    }
}

/// Chainable setters that do not affect type-state
impl<M, R> SessionBuilder<M, R> {
    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.controller = Some(controller);
        self
    }
    pub fn with_driver(mut self, driver: DriverCfg) -> Self {
        self.driver = Some(driver);
        self
    }
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
    /// Power-on register state the first cycle starts from.
    pub fn with_initial_state(mut self, initial: ControllerState) -> Self {
        self.initial = Some(initial);
        self
    }
    /// Checked at cycle boundaries only; a `true` aborts before the next
    /// metering query.
    pub fn with_cancel_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.cancel_check = Some(Box::new(f));
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<R> SessionBuilder<Missing, R> {
    pub fn with_metering_source(
        self,
        metering: impl MeteringSource + 'static,
    ) -> SessionBuilder<Set, R> {
        let SessionBuilder {
            metering: _,
            sink,
            controller,
            driver,
            timeouts,
            initial,
            cancel_check,
            clock,
            _m: _,
            _r: _,
        } = self;
        SessionBuilder {
            metering: Some(Box::new(metering)),
            sink,
            controller,
            driver,
            timeouts,
            initial,
            cancel_check,
            clock,
            _m: PhantomData,
            _r: PhantomData,
        }
    }
}

impl<M> SessionBuilder<M, Missing> {
    pub fn with_register_sink(self, sink: impl RegisterSink + 'static) -> SessionBuilder<M, Set> {
        let SessionBuilder {
            metering,
            sink: _,
            controller,
            driver,
            timeouts,
            initial,
            cancel_check,
            clock,
            _m: _,
            _r: _,
        } = self;
        SessionBuilder {
            metering,
            sink: Some(Box::new(sink)),
            controller,
            driver,
            timeouts,
            initial,
            cancel_check,
            clock,
            _m: PhantomData,
            _r: PhantomData,
        }
    }
}

impl SessionBuilder<Set, Set> {
    /// Validate and build the session. Only available once both the metering
    /// source and the register sink are set.
    pub fn build(self) -> Result<Session> {
        self.try_build()
    }
}

/// Build a generic, statically-dispatched session from concrete source and
/// sink.
#[allow(clippy::too_many_arguments)]
pub fn build_session<M, R>(
    metering: M,
    sink: R,
    controller: ControllerConfig,
    driver: DriverCfg,
    timeouts: Timeouts,
    initial: ControllerState,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ExposureSession<M, R>>
where
    M: MeteringSource + 'static,
    R: RegisterSink + 'static,
{
    validate(&controller, &driver, &timeouts, &initial)?;

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };

    Ok(ExposureSession {
        metering,
        sink,
        controller,
        driver,
        timeouts,
        clock,
        initial,
        state: initial,
        iterations: 0,
        in_band: 0,
        cancel_check,
        last_result: None,
    })
}

// Shared fail-fast validation (non-panicking; returns typed Config errors)
fn validate(
    controller: &ControllerConfig,
    driver: &DriverCfg,
    timeouts: &Timeouts,
    initial: &ControllerState,
) -> Result<()> {
    controller.validate().map_err(eyre::Report::new)?;

    if driver.max_iterations == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_iterations must be >= 1",
        )));
    }
    if driver.stable_iters == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "stable_iters must be >= 1",
        )));
    }
    if !driver.stable_band.is_finite() || driver.stable_band.is_sign_negative() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "stable_band must be >= 0",
        )));
    }
    if timeouts.metering_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "metering_ms must be >= 1",
        )));
    }

    // Initial registers must be inside the hardware domains, though they may
    // exceed the configured soft limits (the first step pulls them back in).
    if !initial.shutter.is_finite() || !(4.0..=16383.0).contains(&initial.shutter) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "initial shutter must be in [4.0, 16383.0]",
        )));
    }
    if !initial.analog_gain.is_finite() || !(1.0..=248.0).contains(&initial.analog_gain) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "initial analog_gain must be in [1.0, 248.0]",
        )));
    }
    for gain in [initial.red_gain, initial.green_gain, initial.blue_gain] {
        if !gain.is_finite() || !(0.0..=1023.0).contains(&gain) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "initial rgb gains must be in [0.0, 1023.0]",
            )));
        }
    }

    Ok(())
}
