//! Student records. The fee engine only reads `join_date` and `monthly_fee`
//! from here; everything else exists so the host can list and scope students.

use crate::fees::model::BillingParams;
use crate::fees::store::{fmt_date, fmt_ts, opt_date_col, opt_decimal_col};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub school_name: Option<String>,
    pub roll_number: Option<String>,
    pub parent_id: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub monthly_fee: Option<Decimal>,
}

impl StudentRecord {
    pub fn billing(&self) -> BillingParams {
        BillingParams {
            join_date: self.join_date,
            monthly_fee: self.monthly_fee,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub name: String,
    pub class_name: String,
    pub school_name: Option<String>,
    pub roll_number: Option<String>,
    pub parent_id: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub monthly_fee: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub search: Option<String>,
    pub parent_id: Option<String>,
    pub page: u32,
    pub limit: u32,
}

const STUDENT_COLUMNS: &str =
    "id, name, class_name, school_name, roll_number, parent_id, join_date, monthly_fee";

fn map_student(row: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        class_name: row.get(2)?,
        school_name: row.get(3)?,
        roll_number: row.get(4)?,
        parent_id: row.get(5)?,
        join_date: opt_date_col(row, 6)?,
        monthly_fee: opt_decimal_col(row, 7)?,
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    conn.query_row(&sql, [student_id], map_student).optional()
}

pub fn find_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE name = ? ORDER BY created_at LIMIT 1");
    conn.query_row(&sql, [name], map_student).optional()
}

pub fn update_billing_params(
    conn: &Connection,
    student_id: &str,
    join_date: Option<NaiveDate>,
    monthly_fee: Option<Decimal>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE students SET join_date = ?, monthly_fee = ? WHERE id = ?",
        (
            join_date.map(fmt_date),
            monthly_fee.map(|f| f.to_string()),
            student_id,
        ),
    )
}

pub fn create_student(
    conn: &Connection,
    student: &NewStudent,
    now: DateTime<Utc>,
) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, class_name, school_name, roll_number, parent_id,
                              join_date, monthly_fee, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student.name,
            &student.class_name,
            student.school_name.as_deref(),
            student.roll_number.as_deref(),
            student.parent_id.as_deref(),
            student.join_date.map(fmt_date),
            student.monthly_fee.map(|f| f.to_string()),
            fmt_ts(now),
        ),
    )?;
    Ok(id)
}

/// One page of students sorted by name, plus the total matching count.
pub fn list_students(
    conn: &Connection,
    query: &StudentQuery,
) -> rusqlite::Result<(Vec<StudentRecord>, i64)> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bind: Vec<Value> = Vec::new();
    if let Some(parent_id) = &query.parent_id {
        clauses.push("parent_id = ?");
        bind.push(Value::Text(parent_id.clone()));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(name LIKE ? OR roll_number LIKE ?)");
        let pattern = format!("%{}%", search);
        bind.push(Value::Text(pattern.clone()));
        bind.push(Value::Text(pattern));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM students {where_sql}"),
        params_from_iter(bind.iter()),
        |r| r.get(0),
    )?;

    let limit = query.limit.max(1);
    let offset = query.page.saturating_sub(1) as i64 * limit as i64;
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students {where_sql}
         ORDER BY name COLLATE NOCASE, id
         LIMIT {limit} OFFSET {offset}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(bind.iter()), map_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((students, total))
}

pub fn all_student_ids(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM students ORDER BY created_at, rowid")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Removes the student together with every fee cycle that references it.
pub fn delete_student(conn: &Connection, student_id: &str) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM fee_cycles WHERE student_id = ?", [student_id])?;
    let removed = tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    tx.commit()?;
    Ok(removed > 0)
}
