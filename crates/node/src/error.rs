//! Error taxonomy for the sampling loop.
//!
//! Hardware failures are `HwError`.  A `HwError` raised while reading a
//! sensor is wrapped in `SensorReadError`, which aborts the current cycle
//! only.  `DeliveryError` is path-local and never aborts anything.

use thiserror::Error;

use crate::calibrate::Sensor;

/// Failure of one hardware transaction (ADC bus, heater pin, radio).
#[derive(Debug, Error)]
pub enum HwError {
    #[error("adc channel {channel} out of range (0-{max})")]
    ChannelOutOfRange { channel: u8, max: u8 },
    #[error("spi transfer failed: {0}")]
    Bus(String),
    #[error("short spi transfer: expected {expected} bytes, got {got}")]
    ShortTransfer { expected: usize, got: usize },
    #[error("gpio write failed: {0}")]
    Pin(String),
    #[error("radio session failed: {0}")]
    Radio(String),
}

#[cfg(feature = "rpi")]
impl From<rppal::spi::Error> for HwError {
    fn from(e: rppal::spi::Error) -> Self {
        HwError::Bus(e.to_string())
    }
}

/// A channel read failed while assembling a reading.
#[derive(Debug, Error)]
#[error("{sensor} sensor read failed")]
pub struct SensorReadError {
    pub sensor: Sensor,
    #[source]
    pub source: HwError,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("primary delivery failed: {0}")]
    PrimaryDeliveryFailed(String),
    #[error("secondary delivery failed: {0}")]
    SecondaryDeliveryFailed(String),
}
