//! Polling scheduler: assemble → transmit → sleep, until interrupted.
//!
//! A cycle always runs to completion.  The shutdown flag is checked after
//! each cycle and during the interval sleep, so an interrupt never lands in
//! the middle of a bus transaction.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::SensorReadError;
use crate::station::Station;
use crate::transmit::{DeliveryReport, Transmitter};

/// What one cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    Sent(DeliveryReport),
    Skipped(SensorReadError),
}

/// Run one sample-and-send cycle.  Never fails: hardware and transport
/// errors are logged and folded into the outcome.
pub async fn run_cycle(station: &mut Station, transmitter: &mut Transmitter) -> CycleOutcome {
    match station.assemble() {
        Ok(reading) => {
            let report = transmitter.transmit(&reading).await;
            if !report.delivered() {
                warn!(timestamp = %reading.timestamp, "reading lost: both paths failed");
            }
            CycleOutcome::Sent(report)
        }
        Err(e) => {
            error!(sensor = %e.sensor, "{e}: {}, skipping cycle", e.source);
            CycleOutcome::Skipped(e)
        }
    }
}

/// Drive cycles every `every` until `shutdown` flips to true.  Returns the
/// number of completed cycles.
pub async fn run(
    station: &mut Station,
    transmitter: &mut Transmitter,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    info!(every_s = every.as_secs_f64(), "polling started");
    let mut cycles: u64 = 0;

    loop {
        run_cycle(station, transmitter).await;
        cycles += 1;

        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = sleep(every) => {}
            // Either a shutdown request or the signal task went away.
            _ = shutdown.changed() => break,
        }
    }

    info!(cycles, "polling stopped");
    cycles
}

// ===========================================================================
// Tests
// ===========================================================================
