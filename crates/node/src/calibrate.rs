//! Raw ADC counts to physical units.
//!
//! Every sensor shares the same normalisation step
//! (`voltage = raw * v_ref / max_raw`) and then applies its own transform:
//!
//! | sensor      | transform                                          |
//! |-------------|----------------------------------------------------|
//! | gas (MQ-4)  | `max(0, (v - offset_v) * gain)` PPM                |
//! | temp (LM35) | `v * degrees_per_volt` °C                          |
//! | pH          | `neutral_ph + (neutral_voltage - v) / slope`       |
//!
//! Only gas concentration is clamped.  A disconnected or miscalibrated
//! temperature or pH probe is allowed to report an absurd value so the
//! fault is visible downstream.

use std::fmt;

/// The three analog sensors on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Gas,
    Temperature,
    Acidity,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gas => write!(f, "gas"),
            Self::Temperature => write!(f, "temperature"),
            Self::Acidity => write!(f, "ph"),
        }
    }
}

/// ADC reference voltage and full-scale count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcScale {
    pub v_ref: f64,
    pub max_raw: u16,
}

impl AdcScale {
    pub fn voltage(&self, raw: u16) -> f64 {
        f64::from(raw) * self.v_ref / f64::from(self.max_raw)
    }
}

/// Per-sensor voltage transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Gas {
        offset_v: f64,
        gain: f64,
    },
    Temperature {
        degrees_per_volt: f64,
    },
    Acidity {
        neutral_ph: f64,
        neutral_voltage: f64,
        slope: f64,
    },
}

impl Transform {
    pub fn apply(&self, voltage: f64) -> f64 {
        match *self {
            Transform::Gas { offset_v, gain } => ((voltage - offset_v) * gain).max(0.0),
            Transform::Temperature { degrees_per_volt } => voltage * degrees_per_volt,
            Transform::Acidity {
                neutral_ph,
                neutral_voltage,
                slope,
            } => neutral_ph + (neutral_voltage - voltage) / slope,
        }
    }
}

/// Full calibration set for one board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub scale: AdcScale,
    pub gas: Transform,
    pub temperature: Transform,
    pub acidity: Transform,
}

impl Calibration {
    pub fn transform(&self, sensor: Sensor) -> &Transform {
        match sensor {
            Sensor::Gas => &self.gas,
            Sensor::Temperature => &self.temperature,
            Sensor::Acidity => &self.acidity,
        }
    }

    /// Convert a raw count from `sensor` into its physical unit.
    pub fn convert(&self, sensor: Sensor, raw: u16) -> f64 {
        self.transform(sensor).apply(self.scale.voltage(raw))
    }
}

impl Default for Calibration {
    /// MCP3008 at 3.3 V with MQ-4, LM35DZ and an analog pH probe.
    fn default() -> Self {
        Self {
            scale: AdcScale {
                v_ref: 3.3,
                max_raw: 1023,
            },
            gas: Transform::Gas {
                offset_v: 0.1,
                gain: 500.0,
            },
            temperature: Transform::Temperature {
                degrees_per_volt: 100.0,
            },
            acidity: Transform::Acidity {
                neutral_ph: 7.0,
                neutral_voltage: 2.5,
                slope: 0.18,
            },
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
