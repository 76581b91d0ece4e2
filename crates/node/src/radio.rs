//! Long-range radio fallback (RA-02 / SX1278 module on SPI1).
//!
//! The transceiver's framing is out of scope: a session is a raw byte pipe
//! that lives for exactly one transfer.  Sessions release their transport on
//! drop, so every exit path of a transfer closes the link.

#[cfg(feature = "rpi")]
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::debug;

use crate::error::HwError;

/// An open byte-transfer session.  Closed when dropped.
pub trait RadioSession {
    fn send(&mut self, bytes: &[u8]) -> Result<(), HwError>;
}

/// Factory for per-cycle radio sessions.
pub trait RadioLink {
    fn open(&mut self) -> Result<Box<dyn RadioSession>, HwError>;
}

// ---------------------------------------------------------------------------
// SPI radio (production)
// ---------------------------------------------------------------------------

#[cfg(feature = "rpi")]
pub struct SpiRadio {
    speed_hz: u32,
}

#[cfg(feature = "rpi")]
impl SpiRadio {
    pub fn new(speed_hz: u32) -> Self {
        Self { speed_hz }
    }
}

#[cfg(feature = "rpi")]
impl RadioLink for SpiRadio {
    fn open(&mut self) -> Result<Box<dyn RadioSession>, HwError> {
        let spi = Spi::new(Bus::Spi1, SlaveSelect::Ss0, self.speed_hz, Mode::Mode0)?;
        debug!(speed_hz = self.speed_hz, "radio session opened on spi1/ce0");
        Ok(Box::new(SpiSession { spi }))
    }
}

#[cfg(feature = "rpi")]
struct SpiSession {
    spi: Spi,
}

#[cfg(feature = "rpi")]
impl RadioSession for SpiSession {
    fn send(&mut self, bytes: &[u8]) -> Result<(), HwError> {
        let n = self.spi.write(bytes)?;
        if n != bytes.len() {
            return Err(HwError::ShortTransfer {
                expected: bytes.len(),
                got: n,
            });
        }
        Ok(())
    }
}

#[cfg(feature = "rpi")]
impl Drop for SpiSession {
    fn drop(&mut self) {
        debug!("radio session closed");
    }
}

// ---------------------------------------------------------------------------
// Logging radio (development)
// ---------------------------------------------------------------------------

/// Accepts every transfer and logs its size.
#[cfg(not(feature = "rpi"))]
pub struct LogRadio;

#[cfg(not(feature = "rpi"))]
impl RadioLink for LogRadio {
    fn open(&mut self) -> Result<Box<dyn RadioSession>, HwError> {
        debug!("[mock-radio] session opened");
        Ok(Box::new(LogSession))
    }
}

#[cfg(not(feature = "rpi"))]
struct LogSession;

#[cfg(not(feature = "rpi"))]
impl RadioSession for LogSession {
    fn send(&mut self, bytes: &[u8]) -> Result<(), HwError> {
        debug!(bytes = bytes.len(), "[mock-radio] transfer");
        Ok(())
    }
}

#[cfg(not(feature = "rpi"))]
impl Drop for LogSession {
    fn drop(&mut self) {
        debug!("[mock-radio] session closed");
    }
}

// ---------------------------------------------------------------------------
// Disabled radio
// ---------------------------------------------------------------------------

/// Used when `radio.enabled = false`: every open fails.
pub struct DisabledRadio;

impl RadioLink for DisabledRadio {
    fn open(&mut self) -> Result<Box<dyn RadioSession>, HwError> {
        Err(HwError::Radio("radio disabled".to_string()))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
