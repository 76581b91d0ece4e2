use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::reading::{format_timestamp, Reading};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<CollectorState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// In-memory counters since process start.  Not persisted.
pub struct CollectorState {
    pub started_at: Instant,
    pub accepted: u64,
    pub rejected: u64,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Ingest,
    Rejected,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub stored_readings: i64,
    pub accepted: u64,
    pub rejected: u64,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl CollectorState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            accepted: 0,
            rejected: 0,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Record an accepted reading.
    pub fn record_ingest(&mut self, id: i64, r: &Reading) {
        self.accepted += 1;
        self.push_event(
            EventKind::Ingest,
            format!(
                "#{id} {}: methane={} temperature={} ph={} heat={}",
                format_timestamp(r.timestamp),
                r.methane,
                r.temperature,
                r.ph,
                r.heat_status
            ),
        );
    }

    /// Record a rejected payload.
    pub fn record_rejected(&mut self, errors: &[String]) {
        self.rejected += 1;
        self.push_event(EventKind::Rejected, errors.join("; "));
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot, newest event first.
    pub fn to_status(&self, stored_readings: i64) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            stored_readings,
            accepted: self.accepted,
            rejected: self.rejected,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
