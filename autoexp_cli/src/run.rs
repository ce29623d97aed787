//! Converge and self-check commands: config mapping, back-end assembly, and
//! session execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use autoexp_core::mocks::{NoopMetering, NullSink};
use autoexp_core::{
    ControllerConfig, ControllerResult, ControllerState, DriverCfg, SessionStatus, Timeouts,
    build_session,
};
use autoexp_hardware::{Scene, SimulatedSensor};
use autoexp_traits::{MeteringSource, RegisterSink};
use serde_json::json;

pub struct ConvergeOpts {
    pub max_iterations: Option<u32>,
    pub settle_ms: Option<u64>,
    pub trace: Option<PathBuf>,
    pub scene_luma: Option<f64>,
    pub print_runtime: bool,
}

pub fn run_converge(
    cfg: &autoexp_config::Config,
    opts: &ConvergeOpts,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    // Config mapping via the From impls in autoexp_core::conversions
    let controller: ControllerConfig = cfg.into();
    let mut driver: DriverCfg = (&cfg.driver).into();
    let timeouts: Timeouts = (&cfg.timeouts).into();
    let initial: ControllerState = (&cfg.registers).into();

    // Apply CLI overrides
    if let Some(n) = opts.max_iterations {
        driver.max_iterations = n;
    }
    if let Some(ms) = opts.settle_ms {
        driver.settle_ms = ms;
    }

    if let Some(trace) = &opts.trace {
        return replay_trace(trace, controller, driver, timeouts, initial, json, shutdown);
    }

    let scene = opts.scene_luma.map(Scene::uniform).unwrap_or_default();
    let sensor = SimulatedSensor::new(scene);
    let cancel: Option<Box<dyn Fn() -> bool>> =
        Some(Box::new(move || shutdown.load(Ordering::Relaxed)));

    let mut session = build_session(
        sensor.clone(),
        sensor,
        controller,
        driver,
        timeouts,
        initial,
        cancel,
        None,
    )?;
    session.begin();
    tracing::info!(backend = "sim", "convergence start");

    let start = Instant::now();
    let mut emitted = 0;
    loop {
        let status = session.step()?;
        if session.iterations() > emitted
            && let Some(result) = session.last_result()
        {
            emitted = session.iterations();
            emit_iteration(emitted, result, json);
        }
        match status {
            SessionStatus::Converging => continue,
            SessionStatus::Settled => {
                let result = session
                    .last_result()
                    .ok_or_else(|| eyre::eyre!("settled with no cycles run"))?;
                emit_settled(session.iterations(), result, json);
                if opts.print_runtime {
                    eprintln!("runtime: {:.2?}", start.elapsed());
                }
                return Ok(());
            }
            SessionStatus::Aborted(e) => {
                tracing::error!(error = %e, "convergence aborted");
                return Err(eyre::Report::new(e));
            }
        }
    }
}

fn replay_trace(
    trace: &Path,
    controller: ControllerConfig,
    mut driver: DriverCfg,
    timeouts: Timeouts,
    initial: ControllerState,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    let rows = autoexp_config::load_metering_csv(trace)?;
    // Offline replay: there is no sensor to settle.
    driver.settle_ms = 0;
    let cancel: Option<Box<dyn Fn() -> bool>> =
        Some(Box::new(move || shutdown.load(Ordering::Relaxed)));

    let mut session = build_session(
        NoopMetering,
        NullSink,
        controller,
        driver,
        timeouts,
        initial,
        cancel,
        None,
    )?;
    session.begin();
    tracing::info!(samples = rows.len(), trace = %trace.display(), "trace replay start");

    for row in &rows {
        match session.step_from_raw(row.to_raw())? {
            SessionStatus::Converging => {
                if let Some(result) = session.last_result() {
                    emit_iteration(session.iterations(), result, json);
                }
            }
            SessionStatus::Settled => {
                let result = session
                    .last_result()
                    .ok_or_else(|| eyre::eyre!("settled with no cycles run"))?;
                emit_iteration(session.iterations(), result, json);
                emit_settled(session.iterations(), result, json);
                return Ok(());
            }
            SessionStatus::Aborted(e) => {
                tracing::error!(error = %e, "trace replay aborted");
                return Err(eyre::Report::new(e));
            }
        }
    }

    // Trace ran out before the session settled: report where the controller
    // ended up so the recording can be judged.
    let result = session
        .last_result()
        .ok_or_else(|| eyre::eyre!("trace replay ran no cycles"))?;
    let registers = result.registers();
    if json {
        println!(
            "{}",
            json!({
                "event": "trace_exhausted",
                "iterations": session.iterations(),
                "error": result.error,
                "shutter": registers.shutter,
                "analog_gain": registers.analog_gain,
                "red_gain": registers.red_gain,
                "green_gain": registers.green_gain,
                "blue_gain": registers.blue_gain,
            })
        );
    } else {
        println!(
            "trace exhausted after {} samples: error {:.4}, shutter {}, analog gain {}",
            session.iterations(),
            result.error,
            registers.shutter,
            registers.analog_gain,
        );
    }
    Ok(())
}

pub fn self_check(json: bool) -> eyre::Result<()> {
    let mut sensor = SimulatedSensor::new(Scene::default());
    let raw = sensor
        .read(Duration::from_millis(10))
        .map_err(|e| eyre::eyre!("simulated metering failed: {e}"))?;
    let registers = sensor.applied();
    let mut sink = sensor.clone();
    sink.apply(registers)
        .map_err(|e| eyre::eyre!("simulated register apply failed: {e}"))?;

    if json {
        println!(
            "{}",
            json!({ "event": "self_check", "ok": true, "sample": raw.to_vec() })
        );
    } else {
        println!("self-check ok: metering sample {raw:?}");
    }
    Ok(())
}

fn emit_iteration(iteration: u32, result: &ControllerResult, json: bool) {
    if !json {
        return;
    }
    let registers = result.registers();
    println!(
        "{}",
        json!({
            "event": "iteration",
            "iteration": iteration,
            "error": result.error,
            "scene_brightness": result.brightness.scene,
            "shutter": registers.shutter,
            "analog_gain": registers.analog_gain,
            "red_gain": registers.red_gain,
            "green_gain": registers.green_gain,
            "blue_gain": registers.blue_gain,
        })
    );
}

fn emit_settled(iterations: u32, result: &ControllerResult, json: bool) {
    let registers = result.registers();
    if json {
        println!(
            "{}",
            json!({
                "event": "settled",
                "iterations": iterations,
                "error": result.error,
                "shutter": registers.shutter,
                "analog_gain": registers.analog_gain,
                "red_gain": registers.red_gain,
                "green_gain": registers.green_gain,
                "blue_gain": registers.blue_gain,
            })
        );
    } else {
        println!(
            "settled after {} iterations: error {:.4}, shutter {}, analog gain {}, rgb gains ({}, {}, {})",
            iterations,
            result.error,
            registers.shutter,
            registers.analog_gain,
            registers.red_gain,
            registers.green_gain,
            registers.blue_gain,
        );
    }
}
