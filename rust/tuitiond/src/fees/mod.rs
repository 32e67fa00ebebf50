//! Fee-cycle engine: generation, reconciliation, overdue sweeps, settlement
//! and administrative repair of a student's monthly fee records.

pub mod actions;
pub mod batch;
pub mod billing;
pub mod error;
pub mod generator;
pub mod import;
pub mod model;
pub mod reconcile;
pub mod repair;
pub mod store;
pub mod summary;
#[cfg(test)]
pub(crate) mod testutil;

use crate::clock::Clock;
use crate::db;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use generator::{GenerationLimits, HARD_CAP_PERIODS};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::warn;

pub use error::{FeeError, FeeResult};

pub const FEES_SETTINGS_KEY: &str = "setup.fees";
pub const DEFAULT_MIN_UNPAID_BUFFER: usize = 3;
pub const DEFAULT_HORIZON_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeConfig {
    pub min_unpaid_buffer: usize,
    pub horizon_months: u32,
    pub max_periods: usize,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            min_unpaid_buffer: DEFAULT_MIN_UNPAID_BUFFER,
            horizon_months: DEFAULT_HORIZON_MONTHS,
            max_periods: HARD_CAP_PERIODS,
        }
    }
}

impl FeeConfig {
    pub fn default_section() -> Value {
        let d = Self::default();
        json!({
            "minUnpaidBuffer": d.min_unpaid_buffer,
            "horizonMonths": d.horizon_months,
            "maxPeriods": d.max_periods,
        })
    }

    /// Reads a persisted `fees` section. Missing or out-of-range values fall
    /// back to defaults.
    pub fn from_section(section: &Value) -> Self {
        let d = Self::default();
        let int = |key: &str, lo: u64, hi: u64| {
            section
                .get(key)
                .and_then(|v| v.as_u64())
                .filter(|n| (lo..=hi).contains(n))
        };
        Self {
            min_unpaid_buffer: int("minUnpaidBuffer", 1, 24)
                .map(|n| n as usize)
                .unwrap_or(d.min_unpaid_buffer),
            horizon_months: int("horizonMonths", 0, 120)
                .map(|n| n as u32)
                .unwrap_or(d.horizon_months),
            max_periods: int("maxPeriods", 1, HARD_CAP_PERIODS as u64)
                .map(|n| n as usize)
                .unwrap_or(d.max_periods),
        }
    }

    pub fn load(conn: &Connection) -> Self {
        match db::settings_get_json(conn, FEES_SETTINGS_KEY) {
            Ok(Some(section)) => Self::from_section(&section),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "failed to read fee settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn limits(&self) -> GenerationLimits {
        GenerationLimits::new(self.horizon_months, self.max_periods)
    }
}

/// Engine bound to one connection, clock and configuration for the duration of
/// a request.
pub struct FeeEngine<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
    config: FeeConfig,
}

impl<'a> FeeEngine<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock, config: FeeConfig) -> Self {
        Self {
            conn,
            clock,
            config,
        }
    }

    pub fn load(conn: &'a Connection, clock: &'a dyn Clock) -> Self {
        Self::new(conn, clock, FeeConfig::load(conn))
    }

    pub fn conn(&self) -> &'a Connection {
        self.conn
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(t).ok().map(|ts| ts.date_naive()))
}

/// Accepts an RFC 3339 timestamp, or a bare date taken as midnight UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(t) {
        return Some(ts.with_timezone(&Utc));
    }
    let midnight = NaiveTime::from_hms_opt(0, 0, 0)?;
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .map(|d| Utc.from_utc_datetime(&d.and_time(midnight)))
}
