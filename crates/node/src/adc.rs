//! MCP3008 10-bit ADC driver over SPI0 for the digester's analog sensors.
//!
//! One full-duplex 3-byte transaction per read:
//!
//! ```text
//!   MOSI: 0000_0001  1ccc_0000  xxxx_xxxx    start bit, single-ended + channel
//!   MISO: xxxx_xxxx  xxxx_x0bb  bbbb_bbbb    null bit + 10 result bits
//! ```

#[cfg(feature = "rpi")]
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::calibrate::Sensor;
use crate::error::HwError;

/// Number of single-ended inputs on the MCP3008.
pub const MCP3008_CHANNELS: u8 = 8;

/// Full-scale count of a 10-bit conversion.
pub const MCP3008_MAX_RAW: u16 = 1023;

/// Start bit, then SGL/DIFF=1 and the 3-bit channel in the high nibble.
fn request_frame(channel: u8) -> [u8; 3] {
    [0x01, (0x08 | channel) << 4, 0x00]
}

/// The low two bits of byte 1 and all of byte 2 hold the result.
fn decode_frame(rx: &[u8; 3]) -> u16 {
    (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2])
}

fn check_channel(channel: u8) -> Result<(), HwError> {
    if channel >= MCP3008_CHANNELS {
        return Err(HwError::ChannelOutOfRange {
            channel,
            max: MCP3008_CHANNELS - 1,
        });
    }
    Ok(())
}

// ── Reader abstraction ─────────────────────────────────────────────────────

/// Something that can sample one multiplexed analog input.
pub trait ChannelReader {
    /// Read the raw count on `channel`.
    fn read_channel(&mut self, channel: u8) -> Result<u16, HwError>;
}

// ── Driver ─────────────────────────────────────────────────────────────────

/// MCP3008 driver backed by `rppal::spi`.  The SPI handle is released when
/// the driver is dropped.
#[cfg(feature = "rpi")]
pub struct Mcp3008 {
    spi: Spi,
}

#[cfg(feature = "rpi")]
impl Mcp3008 {
    /// Open SPI0/CE0 at `speed_hz`.
    pub fn open(speed_hz: u32) -> anyhow::Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, speed_hz, Mode::Mode0)?;
        tracing::info!(speed_hz, "mcp3008 opened on spi0/ce0");
        Ok(Self { spi })
    }
}

#[cfg(feature = "rpi")]
impl ChannelReader for Mcp3008 {
    fn read_channel(&mut self, channel: u8) -> Result<u16, HwError> {
        check_channel(channel)?;
        let tx = request_frame(channel);
        let mut rx = [0u8; 3];
        let n = self.spi.transfer(&mut rx, &tx)?;
        if n != rx.len() {
            return Err(HwError::ShortTransfer {
                expected: rx.len(),
                got: n,
            });
        }
        Ok(decode_frame(&rx))
    }
}

#[cfg(feature = "rpi")]
impl Drop for Mcp3008 {
    fn drop(&mut self) {
        tracing::info!("mcp3008 released");
    }
}

// ── Channel configuration ──────────────────────────────────────────────────

/// Which MCP3008 input each sensor is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap {
    pub gas: u8,
    pub temperature: u8,
    pub ph: u8,
}

impl ChannelMap {
    pub fn channel(&self, sensor: Sensor) -> u8 {
        match sensor {
            Sensor::Gas => self.gas,
            Sensor::Temperature => self.temperature,
            Sensor::Acidity => self.ph,
        }
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            gas: 0,
            temperature: 1,
            ph: 2,
        }
    }
}

/// Parse the `SENSOR_CHANNELS` environment variable into a channel map.
///
/// Format: three comma-separated MCP3008 inputs in the order
/// gas, temperature, pH, e.g. `"0,1,2"`.  Empty input yields the default map.
pub fn parse_channels(env_val: &str) -> anyhow::Result<ChannelMap> {
    if env_val.trim().is_empty() {
        return Ok(ChannelMap::default());
    }

    let mut channels = Vec::with_capacity(3);
    for token in env_val.split(',') {
        let ch: u8 = token
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid channel in SENSOR_CHANNELS: {token:?}"))?;
        anyhow::ensure!(
            ch < MCP3008_CHANNELS,
            "channel {ch} in SENSOR_CHANNELS exceeds maximum ({})",
            MCP3008_CHANNELS - 1
        );
        channels.push(ch);
    }

    match channels[..] {
        [gas, temperature, ph] => Ok(ChannelMap {
            gas,
            temperature,
            ph,
        }),
        _ => anyhow::bail!(
            "SENSOR_CHANNELS needs exactly 3 channels (gas,temperature,ph), got {}",
            channels.len()
        ),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
