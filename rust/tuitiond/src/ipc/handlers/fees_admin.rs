use crate::fees::batch::BatchReport;
use crate::fees::import::StudentFeeImport;
use crate::fees::FeeEngine;
use crate::ipc::auth::require_admin;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::params::{get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use serde::Serialize;
use serde_json::json;

fn report_json<T: Serialize>(report: &BatchReport<T>) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "processed": report.processed,
        "successful": report.succeeded(),
        "skipped": report.skipped,
        "failed": report.failures.len(),
        "results": serde_json::to_value(&report.results)
            .map_err(|e| HandlerErr::new("internal", e.to_string()))?,
        "errors": serde_json::to_value(&report.failures)
            .map_err(|e| HandlerErr::new("internal", e.to_string()))?,
    }))
}

/// One student when `studentId` is given, otherwise everyone.
fn cleanup_duplicates(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(req)?;
    match get_optional_str(&req.params, "studentId")? {
        Some(student_id) => {
            let outcome = eng.dedup_student(&student_id)?;
            Ok(json!({ "outcome": outcome }))
        }
        None => report_json(&eng.cleanup_duplicates_all()?),
    }
}

fn regenerate_cycles(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(req)?;
    match get_optional_str(&req.params, "studentId")? {
        Some(student_id) => {
            let outcome = eng.regenerate_student(&student_id)?;
            Ok(json!({ "outcome": outcome }))
        }
        None => report_json(&eng.regenerate_all()?),
    }
}

fn reset_student(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(req)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let removed = eng.reset_student(&student_id)?;
    Ok(json!({ "studentId": student_id, "removed": removed }))
}

fn delete_fee(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(req)?;
    let fee_id = get_required_str(&req.params, "feeId")?;
    let fee = eng.delete_fee(&fee_id)?;
    Ok(json!({ "deleted": fee }))
}

fn import_fees(eng: &FeeEngine, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor = require_admin(req)?;
    let Some(raw) = req.params.get("records") else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    let records: Vec<StudentFeeImport> = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("records: {}", e)))?;
    if records.is_empty() {
        return Err(HandlerErr::bad_params("records must not be empty"));
    }
    report_json(&eng.import_records(&records, &actor.id))
}

fn handle(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let eng = FeeEngine::load(conn, state.clock.as_ref());
    let result = match req.method.as_str() {
        "fees.cleanupDuplicates" => cleanup_duplicates(&eng, req),
        "fees.regenerateCycles" => regenerate_cycles(&eng, req),
        "fees.resetStudent" => reset_student(&eng, req),
        "fees.delete" => delete_fee(&eng, req),
        "fees.import" => import_fees(&eng, req),
        _ => return err(&req.id, "not_implemented", "unknown fees admin method", None),
    };
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.cleanupDuplicates"
        | "fees.regenerateCycles"
        | "fees.resetStudent"
        | "fees.delete"
        | "fees.import" => Some(handle(state, req)),
        _ => None,
    }
}
