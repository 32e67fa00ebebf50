use crate::ipc::auth::{ensure_can_view, require_actor, require_admin};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::params::{
    get_optional_day, get_optional_money, get_optional_str, get_required_str, get_u32_or,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, NewStudent, StudentQuery};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Reads `page`, `limit` and `search`. Non-admin actors are always scoped to
/// their own students.
pub fn query_from_params(req: &Request) -> Result<StudentQuery, HandlerErr> {
    let actor = require_actor(req)?;
    Ok(StudentQuery {
        search: get_optional_str(&req.params, "search")?,
        parent_id: if actor.is_admin() {
            None
        } else {
            Some(actor.id.clone())
        },
        page: get_u32_or(&req.params, "page", 1, u32::MAX)?,
        limit: get_u32_or(&req.params, "limit", DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)?,
    })
}

fn students_create(conn: &Connection, state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_admin(req)?;
    let student = NewStudent {
        name: get_required_str(&req.params, "name")?,
        class_name: get_required_str(&req.params, "className")?,
        school_name: get_optional_str(&req.params, "schoolName")?,
        roll_number: get_optional_str(&req.params, "rollNumber")?,
        parent_id: get_optional_str(&req.params, "parentId")?,
        join_date: get_optional_day(&req.params, "joinDate")?,
        monthly_fee: get_optional_money(&req.params, "monthlyFee")?,
    };
    let id = roster::create_student(conn, &student, state.clock.now())?;
    info!(student_id = %id, actor_id = %actor.id, "student created");
    let record = roster::get_student(conn, &id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student vanished after insert"))?;
    Ok(json!({ "student": record }))
}

fn students_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let query = query_from_params(req)?;
    let (students, total) = roster::list_students(conn, &query)?;
    Ok(json!({
        "students": students,
        "page": query.page,
        "limit": query.limit,
        "total": total,
    }))
}

fn students_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_actor(req)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let student = roster::get_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", format!("student not found: {}", student_id)))?;
    ensure_can_view(actor, &student)?;
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_admin(req)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    if !roster::delete_student(conn, &student_id)? {
        return Err(HandlerErr::new(
            "not_found",
            format!("student not found: {}", student_id),
        ));
    }
    info!(student_id = %student_id, actor_id = %actor.id, "student deleted with its fee cycles");
    Ok(json!({ "ok": true }))
}

fn handle(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = match req.method.as_str() {
        "students.create" => students_create(conn, state, req),
        "students.list" => students_list(conn, req),
        "students.get" => students_get(conn, req),
        "students.delete" => students_delete(conn, req),
        _ => return err(&req.id, "not_implemented", "unknown students method", None),
    };
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" | "students.list" | "students.get" | "students.delete" => {
            Some(handle(state, req))
        }
        _ => None,
    }
}
