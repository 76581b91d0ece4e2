//! Stateful digester simulator for local development.
//!
//! Stands in for the MCP3008 and produces raw counts for the gas,
//! temperature and pH channels:
//! - Temporal coherence via random walk with mean reversion
//! - Per-read ADC electronic noise
//! - Closed-loop heating: the temperature channel warms while the heat coil
//!   is commanded ON and cools toward ambient otherwise
//! - Optional bus faults (the `flaky` scenario) to exercise skipped cycles

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::adc::{ChannelMap, ChannelReader, MCP3008_CHANNELS};
use crate::error::HwError;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Digester near its set-point.  The coil cycles around 30 °C.
    Steady,
    /// Starts cold (~19 °C).  The coil stays on for a long warm-up.
    Cold,
    /// Steady values, but ~10% of bus transactions fail.
    Flaky,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cold" => Self::Cold,
            "flaky" => Self::Flaky,
            _ => Self::Steady,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steady => write!(f, "steady"),
            Self::Cold => write!(f, "cold"),
            Self::Flaky => write!(f, "flaky"),
        }
    }
}

// ---------------------------------------------------------------------------
// Heater probe
// ---------------------------------------------------------------------------

/// Lets the simulator see the level the heater pin was last driven to.
#[derive(Debug, Clone)]
pub struct HeaterProbe {
    level: Arc<AtomicBool>,
    active_low: bool,
}

impl HeaterProbe {
    pub fn new(active_low: bool) -> Self {
        Self {
            // Idle level: low for active-high wiring, high for active-low.
            level: Arc::new(AtomicBool::new(active_low)),
            active_low,
        }
    }

    /// Shared handle for the pin to write through.
    pub fn level(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.level)
    }

    pub fn is_heating(&self) -> bool {
        self.level.load(Ordering::Relaxed) != self.active_low
    }
}

// ---------------------------------------------------------------------------
// Per-channel state
// ---------------------------------------------------------------------------

/// One simulated analog input, tracked in ADC counts.
struct ChannelState {
    base: f64,
    center: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    noise_sigma: f64,
}

impl ChannelState {
    fn step(&mut self, drift: f64) {
        let pull = self.mean_reversion * (self.center - self.base);
        self.base += pull + gaussian(0.0, self.walk_sigma) + drift;
    }

    fn sample(&self) -> f64 {
        self.base + gaussian(0.0, self.noise_sigma)
    }
}

// ---------------------------------------------------------------------------
// Main simulator
// ---------------------------------------------------------------------------

/// Counts per read the LM35 channel gains while heating (~0.5 °C).
const HEAT_RATE: f64 = 1.5;
/// Counts per read lost toward ambient while idle.
const COOL_RATE: f64 = 0.8;

pub struct DigesterSim {
    channels: ChannelMap,
    max_raw: u16,
    gas: ChannelState,
    temperature: ChannelState,
    ph: ChannelState,
    ambient: f64,
    heater: HeaterProbe,
    fault_prob: f32,
}

impl DigesterSim {
    /// Create a simulator answering on the inputs in `channels`.
    pub fn new(scenario: Scenario, channels: ChannelMap, max_raw: u16, heater: HeaterProbe) -> Self {
        // LM35 at 3.3 V / 1023: ~3.1 counts per °C.
        let (start_temp, fault_prob) = match scenario {
            Scenario::Steady => (92.0, 0.0),
            Scenario::Cold => (60.0, 0.0),
            Scenario::Flaky => (92.0, 0.10),
        };

        Self {
            channels,
            max_raw,
            // MQ-4 around 0.65 V (~270 PPM).
            gas: ChannelState {
                base: 200.0,
                center: 200.0,
                walk_sigma: 4.0,
                mean_reversion: 0.05,
                noise_sigma: 2.0,
            },
            temperature: ChannelState {
                base: start_temp,
                center: start_temp,
                walk_sigma: 0.3,
                mean_reversion: 0.0,
                noise_sigma: 0.5,
            },
            // pH probe near 2.5 V (neutral).
            ph: ChannelState {
                base: 775.0,
                center: 775.0,
                walk_sigma: 3.0,
                mean_reversion: 0.05,
                noise_sigma: 2.0,
            },
            ambient: 60.0,
            heater,
            fault_prob,
        }
    }

    fn clamp(&self, v: f64) -> u16 {
        v.round().clamp(0.0, f64::from(self.max_raw)) as u16
    }
}

impl ChannelReader for DigesterSim {
    fn read_channel(&mut self, channel: u8) -> Result<u16, HwError> {
        if channel >= MCP3008_CHANNELS {
            return Err(HwError::ChannelOutOfRange {
                channel,
                max: MCP3008_CHANNELS - 1,
            });
        }
        if fastrand::f32() < self.fault_prob {
            return Err(HwError::Bus("simulated bus fault".to_string()));
        }

        let value = if channel == self.channels.gas {
            self.gas.step(0.0);
            self.gas.sample()
        } else if channel == self.channels.temperature {
            let drift = if self.heater.is_heating() {
                HEAT_RATE
            } else if self.temperature.base > self.ambient {
                -COOL_RATE
            } else {
                0.0
            };
            self.temperature.step(drift);
            self.temperature.sample()
        } else if channel == self.channels.ph {
            self.ph.step(0.0);
            self.ph.sample()
        } else {
            // Unwired input: floating near ground.
            f64::from(fastrand::u8(0..4))
        };

        Ok(self.clamp(value))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
