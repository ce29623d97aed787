use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use autoexp_core::mocks::NoopMetering;
use autoexp_core::{DriverCfg, Session, SessionStatus};
use autoexp_traits::{Clock, MeteringSource, RawMetering, RegisterSink, SensorRegisters};

/// Metering source that returns a fixed sequence, then repeats the last
/// sample. Counts reads so tests can assert pacing.
struct SeqMetering {
    seq: Vec<RawMetering>,
    idx: usize,
    reads: Arc<Mutex<u32>>,
}

impl SeqMetering {
    fn new(seq: impl Into<Vec<RawMetering>>) -> Self {
        Self {
            seq: seq.into(),
            idx: 0,
            reads: Arc::new(Mutex::new(0)),
        }
    }

    fn read_counter(&self) -> Arc<Mutex<u32>> {
        self.reads.clone()
    }
}

impl MeteringSource for SeqMetering {
    fn read(&mut self, _timeout: Duration) -> Result<RawMetering, Box<dyn Error + Send + Sync>> {
        *self.reads.lock().unwrap() += 1;
        let v = if self.idx < self.seq.len() {
            let x = self.seq[self.idx];
            self.idx += 1;
            x
        } else {
            self.seq.last().copied().unwrap_or([0; 6])
        };
        Ok(v)
    }
}

/// Register sink spy that records every applied value.
#[derive(Default)]
struct SpySink {
    applied: Arc<Mutex<Vec<SensorRegisters>>>,
}

impl SpySink {
    fn log(&self) -> Arc<Mutex<Vec<SensorRegisters>>> {
        self.applied.clone()
    }
}

impl RegisterSink for SpySink {
    fn apply(&mut self, registers: SensorRegisters) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.applied.lock().unwrap().push(registers);
        Ok(())
    }
}

/// Deterministic test clock: sleep() advances virtual time without blocking.
#[derive(Clone)]
struct TestClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }

    fn sleep(&self, d: Duration) {
        *self.offset.lock().unwrap() += d;
    }
}

/// Near-target frame: 46/255 is within 5% of the default 0.18 target.
const IN_BAND: RawMetering = [46; 6];
/// Saturated frame, far over-exposed.
const BRIGHT: RawMetering = [255; 6];

fn fast_driver() -> DriverCfg {
    DriverCfg {
        settle_ms: 0,
        ..DriverCfg::default()
    }
}

#[test]
fn settles_after_consecutive_in_band_cycles() {
    let metering = SeqMetering::new(vec![IN_BAND; 10]);
    let mut session = Session::builder()
        .with_metering_source(metering)
        .with_register_sink(SpySink::default())
        .with_driver(DriverCfg {
            stable_iters: 3,
            ..fast_driver()
        })
        .build()
        .expect("build session");
    session.begin();

    assert!(matches!(session.step().unwrap(), SessionStatus::Converging));
    assert!(matches!(session.step().unwrap(), SessionStatus::Converging));
    assert!(matches!(session.step().unwrap(), SessionStatus::Settled));
    assert_eq!(session.iterations(), 3);
    assert!(session.last_error().is_some());
}

#[test]
fn settles_at_iteration_cap_when_never_in_band() {
    let metering = SeqMetering::new(vec![BRIGHT; 20]);
    let mut session = Session::builder()
        .with_metering_source(metering)
        .with_register_sink(SpySink::default())
        .with_driver(DriverCfg {
            max_iterations: 5,
            stable_band: 1e-9,
            ..fast_driver()
        })
        .build()
        .expect("build session");
    session.begin();

    let mut settled_at = None;
    for i in 1..=10 {
        match session.step().unwrap() {
            SessionStatus::Converging => continue,
            SessionStatus::Settled => {
                settled_at = Some(i);
                break;
            }
            SessionStatus::Aborted(e) => panic!("aborted: {e}"),
        }
    }
    assert_eq!(settled_at, Some(5));
    assert!(session.final_registers().is_some());
}

#[test]
fn settled_session_stays_settled_without_sampling() {
    let metering = SeqMetering::new(vec![IN_BAND; 10]);
    let reads = metering.read_counter();
    let mut session = Session::builder()
        .with_metering_source(metering)
        .with_register_sink(SpySink::default())
        .with_driver(DriverCfg {
            stable_iters: 1,
            ..fast_driver()
        })
        .build()
        .expect("build session");
    session.begin();

    assert!(matches!(session.step().unwrap(), SessionStatus::Settled));
    assert_eq!(*reads.lock().unwrap(), 1);
    // Terminal state: further steps neither sample nor apply.
    assert!(matches!(session.step().unwrap(), SessionStatus::Settled));
    assert_eq!(*reads.lock().unwrap(), 1);
    assert_eq!(session.iterations(), 1);
}

#[test]
fn cancellation_is_checked_before_the_metering_query() {
    let cancel = Arc::new(AtomicBool::new(true));
    let cancel_clone = cancel.clone();
    let metering = SeqMetering::new(vec![IN_BAND; 4]);
    let reads = metering.read_counter();

    let mut session = Session::builder()
        .with_metering_source(metering)
        .with_register_sink(SpySink::default())
        .with_driver(fast_driver())
        .with_cancel_check(move || cancel_clone.load(Ordering::Relaxed))
        .build()
        .expect("build session");
    session.begin();

    match session.step().unwrap() {
        SessionStatus::Aborted(e) => assert!(format!("{e}").contains("cancelled")),
        other => panic!("expected Aborted(cancelled), got {other:?}"),
    }
    // Aborted before the metering source was ever consulted.
    assert_eq!(*reads.lock().unwrap(), 0);

    // Clearing the flag resumes the loop at the next cycle boundary.
    cancel.store(false, Ordering::Relaxed);
    assert!(matches!(session.step().unwrap(), SessionStatus::Converging));
    assert_eq!(*reads.lock().unwrap(), 1);
}

#[test]
fn registers_are_applied_every_cycle() {
    let metering = SeqMetering::new(vec![BRIGHT; 4]);
    let sink = SpySink::default();
    let log = sink.log();

    let mut session = Session::builder()
        .with_metering_source(metering)
        .with_register_sink(sink)
        .with_driver(DriverCfg {
            max_iterations: 3,
            stable_band: 1e-9,
            ..fast_driver()
        })
        .build()
        .expect("build session");
    session.begin();

    while let SessionStatus::Converging = session.step().unwrap() {}

    let applied = log.lock().unwrap();
    assert_eq!(applied.len(), 3);
    // Over-exposed frames keep darkening: shutter must be non-increasing.
    assert!(applied.windows(2).all(|w| w[1].shutter <= w[0].shutter));
    assert_eq!(
        applied.last().copied(),
        session.final_registers(),
        "last applied registers are what a capture would use"
    );
}

#[test]
fn settle_delay_elapses_after_each_apply() {
    let clock = TestClock::new();
    let metering = SeqMetering::new(vec![BRIGHT; 4]);

    let mut session = Session::builder()
        .with_metering_source(metering)
        .with_register_sink(SpySink::default())
        .with_driver(DriverCfg {
            settle_ms: 200,
            max_iterations: 2,
            stable_band: 1e-9,
            ..DriverCfg::default()
        })
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build session");
    session.begin();

    assert!(matches!(session.step().unwrap(), SessionStatus::Converging));
    assert_eq!(clock.elapsed(), Duration::from_millis(200));
    assert!(matches!(session.step().unwrap(), SessionStatus::Settled));
    assert_eq!(clock.elapsed(), Duration::from_millis(400));
}

#[test]
fn metering_failures_retry_then_bubble() {
    struct FlakyMetering {
        failures_left: u32,
        reads: u32,
    }
    impl MeteringSource for FlakyMetering {
        fn read(
            &mut self,
            _timeout: Duration,
        ) -> Result<RawMetering, Box<dyn Error + Send + Sync>> {
            self.reads += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                Err(Box::new(std::io::Error::other("transient transport drop")))
            } else {
                Ok(IN_BAND)
            }
        }
    }

    // Two transient failures within the retry budget: the cycle succeeds.
    let mut session = Session::builder()
        .with_metering_source(FlakyMetering {
            failures_left: 2,
            reads: 0,
        })
        .with_register_sink(SpySink::default())
        .with_driver(DriverCfg {
            read_retries: 3,
            ..fast_driver()
        })
        .with_clock(Box::new(TestClock::new()))
        .build()
        .expect("build session");
    session.begin();
    assert!(matches!(session.step().unwrap(), SessionStatus::Converging));

    // Budget exhausted: the error surfaces with context.
    let mut session = Session::builder()
        .with_metering_source(FlakyMetering {
            failures_left: 10,
            reads: 0,
        })
        .with_register_sink(SpySink::default())
        .with_driver(DriverCfg {
            read_retries: 2,
            ..fast_driver()
        })
        .with_clock(Box::new(TestClock::new()))
        .build()
        .expect("build session");
    session.begin();
    let err = session.step().expect_err("retries exhausted should error");
    assert!(format!("{err}").contains("reading metering sample"));
}

#[test]
fn metering_timeout_maps_to_typed_timeout() {
    struct TimeoutMetering;
    impl MeteringSource for TimeoutMetering {
        fn read(
            &mut self,
            _timeout: Duration,
        ) -> Result<RawMetering, Box<dyn Error + Send + Sync>> {
            Err(Box::new(autoexp_hardware::error::HwError::Timeout))
        }
    }

    let mut session = Session::builder()
        .with_metering_source(TimeoutMetering)
        .with_register_sink(SpySink::default())
        .with_driver(DriverCfg {
            read_retries: 0,
            ..fast_driver()
        })
        .build()
        .expect("build session");
    session.begin();

    let err = session.step().expect_err("timeout should bubble");
    let root = format!("{err:#}").to_lowercase();
    assert!(root.contains("timeout"), "unexpected error: {root}");
}

#[test]
fn apply_failure_bubbles_with_context() {
    struct FailingSink;
    impl RegisterSink for FailingSink {
        fn apply(&mut self, _: SensorRegisters) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("bus write rejected".into())
        }
    }

    let mut session = Session::builder()
        .with_metering_source(SeqMetering::new(vec![IN_BAND]))
        .with_register_sink(FailingSink)
        .with_driver(fast_driver())
        .build()
        .expect("build session");
    session.begin();

    let err = session.step().expect_err("apply failure should error");
    assert!(format!("{err}").contains("applying registers"));
}

#[test]
fn step_from_raw_threads_state_without_a_source() {
    let mut session = Session::builder()
        .with_metering_source(NoopMetering)
        .with_register_sink(SpySink::default())
        .with_driver(fast_driver())
        .build()
        .expect("build session");
    session.begin();

    let before = session.state();
    assert!(matches!(
        session.step_from_raw(BRIGHT).unwrap(),
        SessionStatus::Converging
    ));
    let after = session.state();
    assert!(after.shutter * after.analog_gain < before.shutter * before.analog_gain);
}

#[test]
fn begin_resets_to_initial_state() {
    let mut session = Session::builder()
        .with_metering_source(SeqMetering::new(vec![BRIGHT; 4]))
        .with_register_sink(SpySink::default())
        .with_driver(fast_driver())
        .build()
        .expect("build session");
    session.begin();
    let initial = session.state();

    let _ = session.step().unwrap();
    let _ = session.step().unwrap();
    assert_ne!(session.state(), initial);
    assert_eq!(session.iterations(), 2);

    session.begin();
    assert_eq!(session.state(), initial);
    assert_eq!(session.iterations(), 0);
    assert!(session.last_result().is_none());
}
