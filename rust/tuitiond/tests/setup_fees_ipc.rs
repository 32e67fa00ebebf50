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

#[test]
fn setup_defaults_and_buffer_override() {
    let workspace = temp_dir("tuitiond-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let initial = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(
        initial.pointer("/fees/minUnpaidBuffer").and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(
        initial.pointer("/fees/horizonMonths").and_then(|v| v.as_i64()),
        Some(12)
    );
    assert_eq!(
        initial.pointer("/fees/maxPeriods").and_then(|v| v.as_i64()),
        Some(100)
    );
    assert_eq!(
        initial.pointer("/center/currency").and_then(|v| v.as_str()),
        Some("INR")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "fees", "patch": { "minUnpaidBuffer": 2 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "center", "patch": { "name": "Bright Minds Tuition" } }),
    );

    let only_fees = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.get",
        json!({ "section": "fees" }),
    );
    assert_eq!(
        only_fees.pointer("/fees/minUnpaidBuffer").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert!(only_fees.get("center").is_none());

    let health = request_ok(&mut stdin, &mut reader, "6", "health", json!({}));
    assert_eq!(
        health.pointer("/center/name").and_then(|v| v.as_str()),
        Some("Bright Minds Tuition")
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "name": "Ishaan", "className": "4", "joinDate": "2025-08-01", "monthlyFee": 600 }),
    );
    let sid = created
        .pointer("/student/id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.student",
        json!({ "studentId": sid }),
    );
    assert_eq!(view.get("fees").and_then(|v| v.as_array()).map(Vec::len), Some(2));

    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "9",
        "setup.update",
        json!({ "section": "fees", "patch": { "minUnpaidBuffer": 0 } }),
    );
    assert_eq!(error_code(&out_of_range), Some("bad_params"));

    let unknown = request(
        &mut stdin,
        &mut reader,
        "10",
        "setup.update",
        json!({ "section": "printer", "patch": {} }),
    );
    assert_eq!(error_code(&unknown), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn settings_survive_reopening_the_workspace() {
    let workspace = temp_dir("tuitiond-setup-persist");
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "setup.update",
            json!({ "section": "fees", "patch": { "horizonMonths": 1 } }),
        );
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let got = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(
        got.pointer("/fees/horizonMonths").and_then(|v| v.as_i64()),
        Some(1)
    );

    // With a one-month horizon only August and September fit.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "name": "Dev", "className": "3", "joinDate": "2025-08-01", "monthlyFee": 500 }),
    );
    let sid = created
        .pointer("/student/id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "fees.student",
        json!({ "studentId": sid }),
    );
    assert_eq!(view.get("fees").and_then(|v| v.as_array()).map(Vec::len), Some(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
