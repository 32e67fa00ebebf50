use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

const TODAY: &str = "2025-08-20";

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_tuitiond");
    let mut child = Command::new(exe)
        .env("TUITIOND_TODAY", TODAY)
        .env_remove("TUITIOND_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tuitiond");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn admin() -> serde_json::Value {
    json!({ "id": "admin-1", "role": "admin" })
}

fn request_as(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    actor: serde_json::Value,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
        "actor": actor,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    request_as(stdin, reader, admin(), id, method, params)
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    join_date: &str,
    monthly_fee: i64,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({
            "name": name,
            "className": "10",
            "joinDate": join_date,
            "monthlyFee": monthly_fee
        }),
    );
    created
        .pointer("/student/id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string()
}

fn statuses(view: &serde_json::Value) -> Vec<String> {
    view.get("fees")
        .and_then(|v| v.as_array())
        .expect("fees array")
        .iter()
        .map(|f| f.get("status").and_then(|s| s.as_str()).unwrap_or("").to_string())
        .collect()
}

fn starts(view: &serde_json::Value) -> Vec<String> {
    view.get("fees")
        .and_then(|v| v.as_array())
        .expect("fees array")
        .iter()
        .map(|f| f.get("periodStart").and_then(|s| s.as_str()).unwrap_or("").to_string())
        .collect()
}

#[test]
fn first_view_generates_buffer_from_join_month() {
    let workspace = temp_dir("tuitiond-fee-first-view");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let sid = create_student(&mut stdin, &mut reader, "2", "Meera", "2025-08-15", 1000);

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "fees.student",
        json!({ "studentId": sid }),
    );
    assert_eq!(starts(&view), vec!["2025-08-01", "2025-09-01", "2025-10-01"]);
    assert_eq!(statuses(&view), vec!["pending", "pending", "pending"]);
    assert_eq!(
        view.pointer("/fees/0/label").and_then(|v| v.as_str()),
        Some("August 2025 Fee")
    );
    assert_eq!(
        view.pointer("/fees/0/periodEnd").and_then(|v| v.as_str()),
        Some("2025-08-31")
    );
    assert_eq!(
        view.pointer("/fees/0/amount").and_then(|v| v.as_str()),
        Some("1000")
    );
    assert_eq!(
        view.pointer("/summary/nextDueDate").and_then(|v| v.as_str()),
        Some("2025-08-01")
    );
    assert_eq!(
        view.pointer("/center/currency").and_then(|v| v.as_str()),
        Some("INR")
    );

    // Reading again must not add rows.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "fees.student",
        json!({ "studentId": sid }),
    );
    assert_eq!(starts(&again).len(), 3);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn paying_and_waiving_keep_three_open_cycles() {
    let workspace = temp_dir("tuitiond-fee-settle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let sid = create_student(&mut stdin, &mut reader, "2", "Kabir", "2025-07-10", 1000);

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "fees.student",
        json!({ "studentId": sid }),
    );
    assert_eq!(statuses(&view), vec!["overdue", "pending", "pending"]);
    let count = request_ok(&mut stdin, &mut reader, "4", "fees.overdueCount", json!({}));
    assert_eq!(count.get("count").and_then(|v| v.as_i64()), Some(1));

    let paid = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.markPaid",
        json!({ "studentId": sid, "remarks": "cash" }),
    );
    assert_eq!(paid.pointer("/fee/status").and_then(|v| v.as_str()), Some("paid"));
    assert_eq!(
        paid.pointer("/fee/periodStart").and_then(|v| v.as_str()),
        Some("2025-07-01")
    );
    assert_eq!(
        paid.pointer("/fee/settledBy").and_then(|v| v.as_str()),
        Some("admin-1")
    );

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "fees.student",
        json!({ "studentId": sid }),
    );
    assert_eq!(
        starts(&view),
        vec!["2025-07-01", "2025-08-01", "2025-09-01", "2025-10-01"]
    );
    let august = view
        .pointer("/fees/1/id")
        .and_then(|v| v.as_str())
        .expect("august id")
        .to_string();

    let waived = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.action",
        json!({
            "feeId": august,
            "action": "waived",
            "paidDate": "2025-08-05",
            "remarks": "sibling discount"
        }),
    );
    assert_eq!(waived.pointer("/fee/status").and_then(|v| v.as_str()), Some("waived"));
    assert_eq!(
        waived.pointer("/fee/remarks").and_then(|v| v.as_str()),
        Some("sibling discount")
    );

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.student",
        json!({ "studentId": sid }),
    );
    assert_eq!(
        statuses(&view),
        vec!["paid", "waived", "pending", "pending", "pending"]
    );
    assert_eq!(view.pointer("/summary/pending").and_then(|v| v.as_u64()), Some(3));

    let bad_action = request(
        &mut stdin,
        &mut reader,
        "9",
        "fees.action",
        json!({ "feeId": august, "action": "pending" }),
    );
    assert_eq!(error_code(&bad_action), Some("invalid_action"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "10",
        "fees.action",
        json!({ "feeId": "no-such-fee", "action": "paid" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn fee_change_applies_to_new_cycles_and_join_change_regenerates() {
    let workspace = temp_dir("tuitiond-fee-settings");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let sid = create_student(&mut stdin, &mut reader, "2", "Tara", "2025-08-03", 1000);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "fees.student",
        json!({ "studentId": sid }),
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "fees.updateSettings",
        json!({ "studentId": sid, "monthlyFee": 1500 }),
    );
    assert_eq!(updated.get("monthlyFeeChanged").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(updated.get("joinDateChanged").and_then(|v| v.as_bool()), Some(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.markPaid",
        json!({ "studentId": sid }),
    );
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "fees.student",
        json!({ "studentId": sid }),
    );
    let amounts: Vec<&str> = view
        .get("fees")
        .and_then(|v| v.as_array())
        .expect("fees")
        .iter()
        .filter_map(|f| f.get("amount").and_then(|a| a.as_str()))
        .collect();
    assert_eq!(amounts, vec!["1000", "1000", "1000", "1500"]);

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.updateSettings",
        json!({ "studentId": sid, "joinDate": "2025-06-20" }),
    );
    assert_eq!(moved.get("joinDateChanged").and_then(|v| v.as_bool()), Some(true));
    assert!(moved.get("regenerated").map(|v| v.is_object()).unwrap_or(false));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.student",
        json!({ "studentId": sid }),
    );
    let got = starts(&view);
    assert_eq!(got.first().map(String::as_str), Some("2025-06-01"));
    let mut deduped = got.clone();
    deduped.dedup();
    assert_eq!(deduped, got, "no month may repeat after regeneration");
    assert_eq!(
        view.pointer("/fees/0/status").and_then(|v| v.as_str()),
        Some("overdue")
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "9",
        "fees.updateSettings",
        json!({ "studentId": sid, "monthlyFee": 0 }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
