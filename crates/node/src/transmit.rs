//! Dual-path delivery of readings.
//!
//! Every reading goes out over both paths, unconditionally:
//! - primary: JSON `POST` to the collector (bounded by the client timeout)
//! - secondary: the same JSON written to a fresh radio session
//!
//! A failure on one path never prevents the attempt on the other, and
//! neither is retried within the cycle.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use tracing::{error, info, warn};

use crate::error::{DeliveryError, HwError};
use crate::radio::RadioLink;
use crate::reading::Reading;

/// Outcome of both delivery attempts for one reading.
#[derive(Debug)]
pub struct DeliveryReport {
    pub primary: Result<(), DeliveryError>,
    pub secondary: Result<(), DeliveryError>,
}

impl DeliveryReport {
    /// True when at least one path got the reading out.
    pub fn delivered(&self) -> bool {
        self.primary.is_ok() || self.secondary.is_ok()
    }

    pub fn failures(&self) -> usize {
        usize::from(self.primary.is_err()) + usize::from(self.secondary.is_err())
    }
}

pub struct Transmitter {
    http: reqwest::Client,
    collector_url: String,
    radio: Box<dyn RadioLink>,
}

impl Transmitter {
    pub fn new(collector_url: &str, timeout: Duration, radio: Box<dyn RadioLink>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            collector_url: collector_url.to_string(),
            radio,
        })
    }

    pub async fn transmit(&mut self, reading: &Reading) -> DeliveryReport {
        // Both paths carry the same bytes.
        let payload = match serde_json::to_vec(reading) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(timestamp = %reading.timestamp, "reading could not be serialized: {e}");
                return DeliveryReport {
                    primary: Err(DeliveryError::PrimaryDeliveryFailed(e.to_string())),
                    secondary: Err(DeliveryError::SecondaryDeliveryFailed(e.to_string())),
                };
            }
        };

        let primary = self.send_primary(&payload).await;
        let secondary = self.send_secondary(&payload);

        let report = DeliveryReport { primary, secondary };
        let text = String::from_utf8_lossy(&payload);
        let describe = |r: &Result<(), DeliveryError>| match r {
            Ok(()) => "ok".to_string(),
            Err(e) => e.to_string(),
        };

        if report.failures() == 0 {
            info!(payload = %text, "reading sent on both paths");
        } else {
            warn!(
                payload = %text,
                primary = %describe(&report.primary),
                secondary = %describe(&report.secondary),
                delivered = report.delivered(),
                "reading sent with failures"
            );
        }

        report
    }

    async fn send_primary(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let fail = |e: reqwest::Error| DeliveryError::PrimaryDeliveryFailed(e.to_string());

        self.http
            .post(&self.collector_url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?;
        Ok(())
    }

    fn send_secondary(&mut self, payload: &[u8]) -> Result<(), DeliveryError> {
        let fail = |e: HwError| DeliveryError::SecondaryDeliveryFailed(e.to_string());

        let mut session = self.radio.open().map_err(fail)?;
        session.send(payload).map_err(fail)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
