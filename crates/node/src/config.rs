//! TOML config file loading, environment overrides and validation for the
//! sampling node.  Every field has a default, so a missing file is fine.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::adc::{parse_channels, ChannelMap, MCP3008_CHANNELS, MCP3008_MAX_RAW};
use crate::calibrate::{AdcScale, Calibration, Transform};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collector_url: String,
    pub sample_every_s: u64,
    pub http_timeout_s: u64,
    pub target_temp_c: f64,
    pub adc: AdcEntry,
    pub calibration: CalibrationEntry,
    pub heater: HeaterEntry,
    pub radio: RadioEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdcEntry {
    pub v_ref: f64,
    pub max_raw: u16,
    pub spi_speed_hz: u32,
    pub gas_channel: u8,
    pub temp_channel: u8,
    pub ph_channel: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalibrationEntry {
    pub gas_offset_v: f64,
    pub gas_gain: f64,
    pub degrees_per_volt: f64,
    pub neutral_ph: f64,
    pub neutral_voltage: f64,
    pub ph_slope: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeaterEntry {
    pub gpio_pin: u8,
    pub active_low: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioEntry {
    pub enabled: bool,
    pub spi_speed_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collector_url: "http://127.0.0.1:5000/api/data".to_string(),
            sample_every_s: 5,
            http_timeout_s: 5,
            target_temp_c: 30.0,
            adc: AdcEntry::default(),
            calibration: CalibrationEntry::default(),
            heater: HeaterEntry::default(),
            radio: RadioEntry::default(),
        }
    }
}

impl Default for AdcEntry {
    fn default() -> Self {
        let channels = ChannelMap::default();
        Self {
            v_ref: 3.3,
            max_raw: MCP3008_MAX_RAW,
            spi_speed_hz: 1_000_000,
            gas_channel: channels.gas,
            temp_channel: channels.temperature,
            ph_channel: channels.ph,
        }
    }
}

impl Default for CalibrationEntry {
    fn default() -> Self {
        Self {
            gas_offset_v: 0.1,
            gas_gain: 500.0,
            degrees_per_volt: 100.0,
            neutral_ph: 7.0,
            neutral_voltage: 2.5,
            ph_slope: 0.18,
        }
    }
}

impl Default for HeaterEntry {
    fn default() -> Self {
        Self {
            gpio_pin: 17,
            active_low: false,
        }
    }
}

impl Default for RadioEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            spi_speed_hz: 1_000_000,
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM.
const VALID_GPIO_PINS: std::ops::RangeInclusive<u8> = 2..=27;

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

impl Config {
    pub fn sample_every(&self) -> Duration {
        Duration::from_secs(self.sample_every_s)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_s)
    }

    pub fn channels(&self) -> ChannelMap {
        ChannelMap {
            gas: self.adc.gas_channel,
            temperature: self.adc.temp_channel,
            ph: self.adc.ph_channel,
        }
    }

    pub fn calibration(&self) -> Calibration {
        let c = &self.calibration;
        Calibration {
            scale: AdcScale {
                v_ref: self.adc.v_ref,
                max_raw: self.adc.max_raw,
            },
            gas: Transform::Gas {
                offset_v: c.gas_offset_v,
                gain: c.gas_gain,
            },
            temperature: Transform::Temperature {
                degrees_per_volt: c.degrees_per_volt,
            },
            acidity: Transform::Acidity {
                neutral_ph: c.neutral_ph,
                neutral_voltage: c.neutral_voltage,
                slope: c.ph_slope,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Apply `COLLECTOR_URL`, `SAMPLE_EVERY_S`, `TARGET_TEMP_C` and
    /// `SENSOR_CHANNELS`.  `get` is `std::env::var` in production.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = get("COLLECTOR_URL") {
            self.collector_url = url;
        }
        if let Some(v) = get("SAMPLE_EVERY_S") {
            self.sample_every_s = v
                .trim()
                .parse()
                .with_context(|| format!("invalid SAMPLE_EVERY_S: {v:?}"))?;
        }
        if let Some(v) = get("TARGET_TEMP_C") {
            self.target_temp_c = v
                .trim()
                .parse()
                .with_context(|| format!("invalid TARGET_TEMP_C: {v:?}"))?;
        }
        if let Some(v) = get("SENSOR_CHANNELS") {
            let map = parse_channels(&v)?;
            self.adc.gas_channel = map.gas;
            self.adc.temp_channel = map.temperature;
            self.adc.ph_channel = map.ph;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate the whole config, reporting every violation at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !(self.collector_url.starts_with("http://") || self.collector_url.starts_with("https://"))
        {
            errors.push(format!(
                "collector_url {:?} must start with http:// or https://",
                self.collector_url
            ));
        }
        if self.sample_every_s == 0 {
            errors.push("sample_every_s must be positive".to_string());
        }
        if self.http_timeout_s == 0 {
            errors.push("http_timeout_s must be positive".to_string());
        }
        if !self.target_temp_c.is_finite() {
            errors.push(format!("target_temp_c {} is not finite", self.target_temp_c));
        }

        self.validate_adc(&mut errors);
        self.validate_calibration(&mut errors);

        if !VALID_GPIO_PINS.contains(&self.heater.gpio_pin) {
            errors.push(format!(
                "heater.gpio_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.heater.gpio_pin
            ));
        }
        if self.radio.enabled && self.radio.spi_speed_hz == 0 {
            errors.push("radio.spi_speed_hz must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_adc(&self, errors: &mut Vec<String>) {
        let adc = &self.adc;

        if !(adc.v_ref.is_finite() && adc.v_ref > 0.0) {
            errors.push(format!("adc.v_ref must be positive, got {}", adc.v_ref));
        }
        if adc.max_raw == 0 {
            errors.push("adc.max_raw must be positive".to_string());
        }
        if adc.spi_speed_hz == 0 {
            errors.push("adc.spi_speed_hz must be positive".to_string());
        }

        let mut seen: HashSet<u8> = HashSet::new();
        for (name, ch) in [
            ("gas_channel", adc.gas_channel),
            ("temp_channel", adc.temp_channel),
            ("ph_channel", adc.ph_channel),
        ] {
            if ch >= MCP3008_CHANNELS {
                errors.push(format!(
                    "adc.{name} {ch} out of range (0-{})",
                    MCP3008_CHANNELS - 1
                ));
            } else if !seen.insert(ch) {
                errors.push(format!("adc.{name} {ch} is already used by another sensor"));
            }
        }
    }

    fn validate_calibration(&self, errors: &mut Vec<String>) {
        let c = &self.calibration;

        for (name, v) in [
            ("gas_offset_v", c.gas_offset_v),
            ("gas_gain", c.gas_gain),
            ("degrees_per_volt", c.degrees_per_volt),
            ("neutral_ph", c.neutral_ph),
            ("neutral_voltage", c.neutral_voltage),
            ("ph_slope", c.ph_slope),
        ] {
            if !v.is_finite() {
                errors.push(format!("calibration.{name} {v} is not finite"));
            }
        }
        if c.ph_slope == 0.0 {
            errors.push("calibration.ph_slope must be non-zero".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read `path` (defaults if it does not exist), apply environment
/// overrides, and validate.
pub fn load(path: &str) -> Result<Config> {
    let mut config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::info!(path, "no config file, using defaults");
        Config::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
