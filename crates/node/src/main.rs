mod adc;
mod calibrate;
mod config;
mod error;
mod heater;
mod poll;
mod radio;
mod reading;
#[cfg(feature = "sim")]
mod sim;
mod station;
mod transmit;

#[cfg(not(any(feature = "sim", feature = "rpi")))]
compile_error!("enable the `sim` or the `rpi` feature");

use anyhow::Result;
use std::env;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use heater::Heater;
use radio::{DisabledRadio, RadioLink};
use station::Station;
use transmit::Transmitter;

// ---------------------------------------------------------------------------
// Hardware acquisition
// ---------------------------------------------------------------------------

/// Acquire the SPI0 ADC, heat coil pin and SPI1 radio on a Raspberry Pi.
#[cfg(feature = "rpi")]
fn open_hardware(cfg: &Config) -> Result<(Station, Box<dyn RadioLink>)> {
    use adc::Mcp3008;
    use heater::GpioPin;
    use radio::SpiRadio;

    let adc = Mcp3008::open(cfg.adc.spi_speed_hz)?;
    let pin = GpioPin::open(cfg.heater.gpio_pin)?;
    let heater = Heater::new(Box::new(pin), cfg.target_temp_c, cfg.heater.active_low)?;
    let station = Station::new(Box::new(adc), cfg.channels(), cfg.calibration(), heater);

    let radio: Box<dyn RadioLink> = if cfg.radio.enabled {
        Box::new(SpiRadio::new(cfg.radio.spi_speed_hz))
    } else {
        Box::new(DisabledRadio)
    };
    Ok((station, radio))
}

/// Wire the simulator in place of the board.
#[cfg(all(feature = "sim", not(feature = "rpi")))]
fn open_hardware(cfg: &Config) -> Result<(Station, Box<dyn RadioLink>)> {
    use heater::MockPin;
    use radio::LogRadio;
    use sim::{DigesterSim, HeaterProbe, Scenario};

    let scenario = Scenario::from_str_lossy(&env::var("SIM_SCENARIO").unwrap_or_default());
    let probe = HeaterProbe::new(cfg.heater.active_low);
    let adc = DigesterSim::new(scenario, cfg.channels(), cfg.adc.max_raw, probe.clone());
    let pin = MockPin::new(cfg.heater.gpio_pin, probe.level());
    let heater = Heater::new(Box::new(pin), cfg.target_temp_c, cfg.heater.active_low)?;
    let station = Station::new(Box::new(adc), cfg.channels(), cfg.calibration(), heater);
    info!(%scenario, "simulated digester ready (no hardware)");

    let radio: Box<dyn RadioLink> = if cfg.radio.enabled {
        Box::new(LogRadio)
    } else {
        Box::new(DisabledRadio)
    };
    Ok((station, radio))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "node.toml".to_string());
    let cfg = config::load(&config_path)?;
    info!(
        collector = %cfg.collector_url,
        every_s = cfg.sample_every_s,
        target_c = cfg.target_temp_c,
        radio = cfg.radio.enabled,
        "biogas node starting"
    );

    // ── Hardware (fatal if it cannot be acquired) ───────────────────
    let (mut station, radio) = open_hardware(&cfg)?;
    let mut transmitter = Transmitter::new(&cfg.collector_url, cfg.http_timeout(), radio)?;

    // ── Interrupt handling ──────────────────────────────────────────
    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current cycle");
                let _ = stop.send(true);
            }
            Err(e) => {
                error!("failed to listen for interrupt: {e}");
                // Keep the sender alive so the loop is not stopped.
                std::future::pending::<()>().await;
            }
        }
    });

    let cycles = poll::run(&mut station, &mut transmitter, cfg.sample_every(), shutdown).await;

    info!(cycles, heat = %station.heater().state(), "polling finished");
    // Releases the ADC bus and switches the coil off.
    drop(station);
    info!("biogas node stopped");
    Ok(())
}
