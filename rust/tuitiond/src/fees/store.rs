use crate::fees::generator::CandidatePeriod;
use crate::fees::model::{FeeCycle, FeeStatus};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

const CYCLE_COLUMNS: &str = "rowid, id, student_id, label, amount, period_start, period_end, status,
     paid_at, settled_by, remarks, created_at";

pub fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_err(idx, e))
}

pub(crate) fn opt_date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn opt_decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn map_cycle(row: &Row<'_>) -> rusqlite::Result<FeeCycle> {
    let amount_raw: String = row.get(4)?;
    let status_raw: String = row.get(7)?;
    let status = FeeStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Text,
            format!("unknown fee status {status_raw:?}").into(),
        )
    })?;
    Ok(FeeCycle {
        seq: row.get(0)?,
        id: row.get(1)?,
        student_id: row.get(2)?,
        label: row.get(3)?,
        amount: Decimal::from_str(&amount_raw).map_err(|e| conversion_err(4, e))?,
        period_start: date_col(row, 5)?,
        period_end: date_col(row, 6)?,
        status,
        paid_at: ts_col(row, 8)?,
        settled_by: row.get(9)?,
        remarks: row.get(10)?,
        created_at: ts_col(row, 11)?.unwrap_or_default(),
    })
}

/// All cycles of a student ordered by period start, then creation order.
pub fn load_cycles(conn: &Connection, student_id: &str) -> rusqlite::Result<Vec<FeeCycle>> {
    let sql = format!(
        "SELECT {CYCLE_COLUMNS} FROM fee_cycles
         WHERE student_id = ?
         ORDER BY period_start, created_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([student_id], map_cycle)?;
    rows.collect()
}

pub fn get_cycle(conn: &Connection, fee_id: &str) -> rusqlite::Result<Option<FeeCycle>> {
    let sql = format!("SELECT {CYCLE_COLUMNS} FROM fee_cycles WHERE id = ?");
    conn.query_row(&sql, [fee_id], map_cycle).optional()
}

/// Inserts candidates for one student. A period that already has a row for the
/// student is skipped, so concurrent callers cannot double-insert. Returns the
/// number of rows actually written.
pub fn insert_candidates(
    conn: &Connection,
    student_id: &str,
    candidates: &[CandidatePeriod],
    today: NaiveDate,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    let created_at = fmt_ts(now);
    let mut stmt = conn.prepare(
        "INSERT INTO fee_cycles(id, student_id, label, amount, period_start, period_end, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, period_start) DO NOTHING",
    )?;
    let mut inserted = 0;
    for c in candidates {
        let status = FeeStatus::initial_for(c.period_end, today);
        inserted += stmt.execute((
            Uuid::new_v4().to_string(),
            student_id,
            &c.label,
            c.amount.to_string(),
            fmt_date(c.period_start),
            fmt_date(c.period_end),
            status.as_str(),
            &created_at,
        ))?;
    }
    Ok(inserted)
}

/// Flips elapsed pending cycles to overdue, for one student or all of them.
pub fn mark_overdue(
    conn: &Connection,
    student_id: Option<&str>,
    today: NaiveDate,
) -> rusqlite::Result<usize> {
    let today = fmt_date(today);
    match student_id {
        Some(sid) => conn.execute(
            "UPDATE fee_cycles SET status = 'overdue'
             WHERE student_id = ? AND status = 'pending' AND period_end < ?",
            (sid, &today),
        ),
        None => conn.execute(
            "UPDATE fee_cycles SET status = 'overdue'
             WHERE status = 'pending' AND period_end < ?",
            [&today],
        ),
    }
}

pub fn settle(
    conn: &Connection,
    fee_id: &str,
    status: FeeStatus,
    paid_at: DateTime<Utc>,
    settled_by: &str,
    remarks: Option<&str>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE fee_cycles
         SET status = ?, paid_at = ?, settled_by = ?, remarks = COALESCE(?, remarks)
         WHERE id = ?",
        (status.as_str(), fmt_ts(paid_at), settled_by, remarks, fee_id),
    )
}

pub fn update_bounds(
    conn: &Connection,
    fee_id: &str,
    label: &str,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE fee_cycles SET label = ?, period_start = ?, period_end = ? WHERE id = ?",
        (label, fmt_date(period_start), fmt_date(period_end), fee_id),
    )
}

pub fn delete_cycle(conn: &Connection, fee_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM fee_cycles WHERE id = ?", [fee_id])
}

pub fn delete_unsettled(conn: &Connection, student_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM fee_cycles WHERE student_id = ? AND status IN ('pending', 'overdue')",
        [student_id],
    )
}

pub fn delete_all_for_student(conn: &Connection, student_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM fee_cycles WHERE student_id = ?", [student_id])
}

/// Counts cycles in `status`, optionally only for students linked to
/// `parent_id`.
pub fn count_with_status(
    conn: &Connection,
    status: FeeStatus,
    parent_id: Option<&str>,
) -> rusqlite::Result<i64> {
    match parent_id {
        None => conn.query_row(
            "SELECT COUNT(*) FROM fee_cycles WHERE status = ?",
            [status.as_str()],
            |r| r.get(0),
        ),
        Some(parent_id) => conn.query_row(
            "SELECT COUNT(*) FROM fee_cycles f
             JOIN students s ON s.id = f.student_id
             WHERE f.status = ? AND s.parent_id = ?",
            [status.as_str(), parent_id],
            |r| r.get(0),
        ),
    }
}

/// Row shape accepted by `upsert_imported`.
#[derive(Debug, Clone)]
pub struct ImportedCycle {
    pub label: String,
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: FeeStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

/// Ids of the student's cycles that overlap `start..=end` without sharing its
/// period start. An import row with the same start updates in place instead.
pub fn find_overlapping(
    conn: &Connection,
    student_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM fee_cycles
         WHERE student_id = ? AND period_start <= ? AND period_end >= ? AND period_start <> ?
         ORDER BY period_start",
    )?;
    let rows = stmt.query_map(
        (student_id, fmt_date(end), fmt_date(start), fmt_date(start)),
        |r| r.get(0),
    )?;
    rows.collect()
}

/// Returns true when a new row was created, false when an existing row for the
/// same period start was overwritten.
pub fn upsert_imported(
    conn: &Connection,
    student_id: &str,
    fee: &ImportedCycle,
    settled_by: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM fee_cycles WHERE student_id = ? AND period_start = ?",
            (student_id, fmt_date(fee.period_start)),
            |r| r.get(0),
        )
        .optional()?;
    let settled_by = fee.status.is_settled().then_some(settled_by);
    let paid_at = fee.paid_at.map(fmt_ts);
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE fee_cycles
                 SET label = ?, amount = ?, period_end = ?, status = ?,
                     paid_at = COALESCE(?, paid_at), settled_by = COALESCE(?, settled_by),
                     remarks = COALESCE(?, remarks)
                 WHERE id = ?",
                (
                    &fee.label,
                    fee.amount.to_string(),
                    fmt_date(fee.period_end),
                    fee.status.as_str(),
                    paid_at,
                    settled_by,
                    fee.remarks.as_deref(),
                    &id,
                ),
            )?;
            Ok(false)
        }
        None => {
            conn.execute(
                "INSERT INTO fee_cycles(id, student_id, label, amount, period_start, period_end,
                                        status, paid_at, settled_by, remarks, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    student_id,
                    &fee.label,
                    fee.amount.to_string(),
                    fmt_date(fee.period_start),
                    fmt_date(fee.period_end),
                    fee.status.as_str(),
                    paid_at,
                    settled_by,
                    fee.remarks.as_deref(),
                    fmt_ts(now),
                ),
            )?;
            Ok(true)
        }
    }
}
