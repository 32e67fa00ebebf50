use crate::fees::generator::{candidate_for, month_end, period_label};
use crate::fees::model::{FeeCycle, FeeStatus};
use crate::fees::store::{fmt_date, fmt_ts};
use crate::roster::{self, NewStudent};
use chrono::{NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
}

pub fn seed_student(
    conn: &Connection,
    join_date: Option<NaiveDate>,
    monthly_fee: Option<Decimal>,
) -> String {
    let student = NewStudent {
        name: format!("Student {}", &Uuid::new_v4().to_string()[..8]),
        class_name: "10".to_string(),
        join_date,
        monthly_fee,
        ..NewStudent::default()
    };
    roster::create_student(conn, &student, Utc::now()).expect("create student")
}

/// Inserts a calendar-aligned cycle directly, without going through the engine.
pub fn seed_cycle(conn: &Connection, student_id: &str, start: NaiveDate, status: FeeStatus) -> String {
    seed_cycle_range(conn, student_id, start, month_end(start), status)
}

pub fn seed_cycle_range(
    conn: &Connection,
    student_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    status: FeeStatus,
) -> String {
    let id = Uuid::new_v4().to_string();
    let c = candidate_for(start, Decimal::new(1000, 0));
    conn.execute(
        "INSERT INTO fee_cycles(id, student_id, label, amount, period_start, period_end, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            student_id,
            &c.label,
            c.amount.to_string(),
            fmt_date(start),
            fmt_date(end),
            status.as_str(),
            fmt_ts(Utc::now()),
        ),
    )
    .expect("seed cycle");
    id
}

pub fn cycle(id: &str, start: NaiveDate, end: NaiveDate, status: FeeStatus) -> FeeCycle {
    FeeCycle {
        seq: 0,
        id: id.to_string(),
        student_id: "s".to_string(),
        label: period_label(start),
        amount: Decimal::ONE,
        period_start: start,
        period_end: end,
        status,
        paid_at: None,
        settled_by: None,
        remarks: None,
        created_at: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
    }
}
