pub mod error;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use autoexp_traits::{MeteringSource, RawMetering, RegisterSink, SensorRegisters};

/// Per-channel scene luminance for the simulated sensor, roughly 0..1.
///
/// `spot` is the center-spot region, `matrix` the full frame. Values above
/// 1.0 are allowed and saturate the simulated readout, like a real sensor.
#[derive(Debug, Clone, Copy)]
pub struct Scene {
    pub spot: [f64; 3],
    pub matrix: [f64; 3],
}

impl Default for Scene {
    fn default() -> Self {
        // Mid-gray frame with a slightly brighter center
        Self {
            spot: [0.55, 0.55, 0.55],
            matrix: [0.5, 0.5, 0.5],
        }
    }
}

impl Scene {
    /// Uniform gray scene with the given luminance in both regions.
    pub fn uniform(luma: f64) -> Self {
        Self {
            spot: [luma; 3],
            matrix: [luma; 3],
        }
    }
}

/// Exposure normalization of the simulated readout. With power-on registers
/// (shutter 1600, analog gain 1, green gain 64) a mid-gray scene meters
/// around one third of full scale, leaving the loop visible headroom.
const EXPOSURE_SCALE: f64 = 1000.0;

#[derive(Debug)]
struct SimState {
    scene: Scene,
    applied: SensorRegisters,
}

/// Simulated sensor: a metering source and register sink over one shared
/// scene. Cloning yields handles onto the same sensor, so a session can own
/// one clone as its metering source and another as its register sink.
///
/// The readout is post-gain: each channel meters proportionally to
/// `scene * shutter * analog_gain * rgb_gain/256`, saturating at 255. That
/// makes closed-loop convergence observable without hardware.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSensor {
    pub fn new(scene: Scene) -> Self {
        Self::with_registers(
            scene,
            SensorRegisters {
                shutter: 1600,
                analog_gain: 1,
                red_gain: 122,
                green_gain: 64,
                blue_gain: 141,
            },
        )
    }

    /// Start from explicit power-on registers instead of the defaults.
    pub fn with_registers(scene: Scene, applied: SensorRegisters) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState { scene, applied })),
        }
    }

    /// Registers currently applied to the simulated sensor.
    pub fn applied(&self) -> SensorRegisters {
        self.lock().applied
    }

    /// Replace the scene mid-session (e.g. to simulate a lighting change).
    pub fn set_scene(&self, scene: Scene) {
        self.lock().scene = scene;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn meter_channel(scene_c: f64, rgb_gain: u16, regs: SensorRegisters) -> u8 {
        let exposure = f64::from(regs.shutter) * f64::from(regs.analog_gain);
        let level = scene_c * exposure * (f64::from(rgb_gain) / 256.0) / EXPOSURE_SCALE;
        (255.0 * level.clamp(0.0, 1.0)).round() as u8
    }
}

impl MeteringSource for SimulatedSensor {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<RawMetering, Box<dyn std::error::Error + Send + Sync>> {
        let (scene, regs) = {
            let s = self.lock();
            (s.scene, s.applied)
        };
        let gains = [regs.red_gain, regs.green_gain, regs.blue_gain];
        let mut out = [0u8; 6];
        for i in 0..3 {
            out[i] = Self::meter_channel(scene.spot[i], gains[i], regs);
            out[i + 3] = Self::meter_channel(scene.matrix[i], gains[i], regs);
        }
        tracing::debug!(?out, "simulated metering sample");
        Ok(out)
    }
}

impl RegisterSink for SimulatedSensor {
    fn apply(
        &mut self,
        registers: SensorRegisters,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(?registers, "simulated register apply");
        self.lock().applied = registers;
        Ok(())
    }
}
