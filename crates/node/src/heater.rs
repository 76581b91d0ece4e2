//! Heat coil control.  The `rpi` feature gates the real rppal pin; without
//! it, a mock pin logs level changes and exposes them to the simulator.
//!
//! The controller is a plain threshold rule evaluated once per cycle:
//!
//! ```text
//!   temp <  target  ──▶  ON   (pin driven to the active level)
//!   temp >= target  ──▶  OFF  (pin driven to the idle level)
//! ```

#[cfg(not(feature = "rpi"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(feature = "rpi"))]
use std::sync::Arc;

#[cfg(feature = "rpi")]
use rppal::gpio::{Gpio, OutputPin};
use tracing::{debug, info, warn};

use crate::error::HwError;
use crate::reading::HeatStatus;

/// Digital output driving the heat coil relay.
pub trait HeaterPin {
    fn set_level(&mut self, high: bool) -> Result<(), HwError>;
}

// ---------------------------------------------------------------------------
// Real GPIO pin (production, requires rppal on a Raspberry Pi)
// ---------------------------------------------------------------------------
#[cfg(feature = "rpi")]
pub struct GpioPin {
    pin: OutputPin,
}

#[cfg(feature = "rpi")]
impl GpioPin {
    pub fn open(bcm_pin: u8) -> anyhow::Result<Self> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_output();
        info!(gpio = bcm_pin, "heat coil pin acquired");
        Ok(Self { pin })
    }
}

#[cfg(feature = "rpi")]
impl HeaterPin for GpioPin {
    fn set_level(&mut self, high: bool) -> Result<(), HwError> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock pin (development, no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "rpi"))]
pub struct MockPin {
    gpio: u8,
    level: Arc<AtomicBool>,
}

#[cfg(not(feature = "rpi"))]
impl MockPin {
    pub fn new(gpio: u8, level: Arc<AtomicBool>) -> Self {
        info!(gpio, "[mock-gpio] heat coil pin registered (not wired)");
        Self { gpio, level }
    }
}

#[cfg(not(feature = "rpi"))]
impl HeaterPin for MockPin {
    fn set_level(&mut self, high: bool) -> Result<(), HwError> {
        let prev = self.level.swap(high, Ordering::Relaxed);
        if prev != high {
            debug!(
                gpio = self.gpio,
                level = if high { "HIGH" } else { "LOW" },
                "[mock-gpio] level changed"
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The control rule: heat while below target.  No deadband.
pub fn decide(current_c: f64, target_c: f64) -> HeatStatus {
    if current_c < target_c {
        HeatStatus::On
    } else {
        HeatStatus::Off
    }
}

/// Owns the heat coil pin and the last commanded state.
///
/// The pin is driven OFF when the controller is built and again when it is
/// dropped, so the coil is never left energised by a shutdown.
pub struct Heater {
    pin: Box<dyn HeaterPin>,
    target_c: f64,
    active_low: bool,
    state: HeatStatus,
}

impl Heater {
    pub fn new(pin: Box<dyn HeaterPin>, target_c: f64, active_low: bool) -> Result<Self, HwError> {
        let mut heater = Self {
            pin,
            target_c,
            active_low,
            state: HeatStatus::Off,
        };
        heater.drive(HeatStatus::Off)?;
        Ok(heater)
    }

    /// Evaluate the rule against `current_c` and command the coil.
    ///
    /// On a pin failure the previous state is kept and the error returned.
    pub fn regulate(&mut self, current_c: f64) -> Result<HeatStatus, HwError> {
        let next = decide(current_c, self.target_c);
        self.drive(next)?;
        if next != self.state {
            info!(
                from = %self.state,
                to = %next,
                temp_c = current_c,
                target_c = self.target_c,
                "heat coil switched"
            );
        }
        self.state = next;
        Ok(next)
    }

    pub fn state(&self) -> HeatStatus {
        self.state
    }

    fn drive(&mut self, status: HeatStatus) -> Result<(), HwError> {
        // active-low relay: LOW = ON, HIGH = OFF
        let high = status.is_on() != self.active_low;
        self.pin.set_level(high)
    }
}

impl Drop for Heater {
    fn drop(&mut self) {
        match self.drive(HeatStatus::Off) {
            Ok(()) => info!("heat coil released (OFF)"),
            Err(e) => warn!("failed to switch heat coil off on release: {e}"),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
