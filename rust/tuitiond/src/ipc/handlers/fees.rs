use crate::fees::billing::BillingUpdate;
use crate::fees::FeeEngine;
use crate::ipc::auth::{ensure_can_view, require_actor, require_admin};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::handlers::students::query_from_params;
use crate::ipc::params::{
    get_optional_day, get_optional_instant, get_optional_money, get_optional_str,
    get_required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde_json::json;
use tracing::warn;

fn fees_student(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_actor(req)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let student = roster::get_student(eng.conn(), &student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", format!("student not found: {}", student_id)))?;
    ensure_can_view(actor, &student)?;

    let view = eng.student_fees(&student_id)?;
    let center = match setup::load_center(eng.conn()) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "center settings unreadable");
            serde_json::Value::Null
        }
    };
    Ok(json!({
        "student": view.student,
        "summary": view.summary,
        "fees": view.fees,
        "center": center,
    }))
}

fn fees_all_students(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let query = query_from_params(req)?;
    let (rows, total) = eng.all_students(&query)?;
    Ok(json!({
        "students": rows,
        "page": query.page,
        "limit": query.limit,
        "total": total,
    }))
}

fn fees_mark_paid(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_admin(req)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let remarks = get_optional_str(&req.params, "remarks")?;
    let fee = eng.mark_earliest_unpaid(&student_id, &actor.id, remarks.as_deref())?;
    Ok(json!({ "fee": fee }))
}

fn fees_action(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_admin(req)?;
    let fee_id = get_required_str(&req.params, "feeId")?;
    let action = get_required_str(&req.params, "action")?;
    let remarks = get_optional_str(&req.params, "remarks")?;
    let paid_at = get_optional_instant(&req.params, "paidDate")?;
    let fee = eng.apply_action(&fee_id, &action, &actor.id, paid_at, remarks.as_deref())?;
    Ok(json!({ "fee": fee }))
}

fn fees_update_settings(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(req)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let update = BillingUpdate {
        join_date: get_optional_day(&req.params, "joinDate")?,
        monthly_fee: get_optional_money(&req.params, "monthlyFee")?,
    };
    let outcome = eng.update_billing(&student_id, update)?;
    serde_json::to_value(outcome).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn fees_overdue_count(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_actor(req)?;
    let scope = if actor.is_admin() {
        None
    } else {
        Some(actor.id.as_str())
    };
    let count = eng.overdue_count(scope)?;
    Ok(json!({ "count": count }))
}

fn fees_sweep_overdue(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(req)?;
    let student_id = get_optional_str(&req.params, "studentId")?;
    let marked = eng.sweep_overdue(student_id.as_deref())?;
    Ok(json!({ "markedOverdue": marked }))
}

fn handle(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let eng = FeeEngine::load(conn, state.clock.as_ref());
    let result = match req.method.as_str() {
        "fees.student" => fees_student(&eng, req),
        "fees.allStudents" => fees_all_students(&eng, req),
        "fees.markPaid" => fees_mark_paid(&eng, req),
        "fees.action" => fees_action(&eng, req),
        "fees.updateSettings" => fees_update_settings(&eng, req),
        "fees.overdueCount" => fees_overdue_count(&eng, req),
        "fees.sweepOverdue" => fees_sweep_overdue(&eng, req),
        _ => return err(&req.id, "not_implemented", "unknown fees method", None),
    };
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.student"
        | "fees.allStudents"
        | "fees.markPaid"
        | "fees.action"
        | "fees.updateSettings"
        | "fees.overdueCount"
        | "fees.sweepOverdue" => Some(handle(state, req)),
        _ => None,
    }
}
