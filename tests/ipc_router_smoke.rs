use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

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
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn result_of(value: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response, got {value}"
    );
    value.get("result").expect("result")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schoold-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let seeded = request(&mut stdin, &mut reader, "3", "admin.seed", json!({}));
    let seed_result = result_of(&seeded);
    assert_eq!(seed_result.get("grades").and_then(|v| v.as_i64()), Some(13));
    assert_eq!(seed_result.get("classes").and_then(|v| v.as_i64()), Some(78));

    let grades = request(&mut stdin, &mut reader, "4", "grades.list", json!({}));
    let grade_rows = result_of(&grades)
        .get("grades")
        .and_then(|v| v.as_array())
        .expect("grades array")
        .clone();
    assert_eq!(grade_rows.len(), 13);
    let grade_id = grade_rows[0]
        .get("id")
        .and_then(|v| v.as_str())
        .expect("grade id")
        .to_string();

    let _ = request(&mut stdin, &mut reader, "5", "classes.list", json!({}));
    let created = request(
        &mut stdin,
        &mut reader,
        "6",
        "classes.create",
        json!({ "name": "RZ-extra", "gradeId": grade_id }),
    );
    let class_id = result_of(&created)
        .get("class")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "classId": class_id }),
    );
    let created_student = request(
        &mut stdin,
        &mut reader,
        "7a",
        "students.create",
        json!({
            "classId": class_id,
            "lastName": "Smoke",
            "firstName": "Student",
            "active": true
        }),
    );
    let student_id = result_of(&created_student)
        .get("student")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "7b",
        "students.update",
        json!({
            "studentId": student_id,
            "patch": { "firstName": "Updated" }
        }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "announcements.create",
        json!({
            "title": "Sports day",
            "body": "Fields close at noon.",
            "date": "2026-09-01"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8a",
        "announcements.list",
        json!({ "search": "sports" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "events.create",
        json!({
            "title": "Parents evening",
            "body": "Hall A",
            "startTime": "2026-09-10T18:00:00Z",
            "endTime": "2026-09-10T20:00:00Z",
            "classId": class_id
        }),
    );
    let _ = request(&mut stdin, &mut reader, "9a", "events.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "reports.create",
        json!({ "studentId": student_id, "exam": "Term 1", "score": 71.5 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10a",
        "reports.list",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "lessons.create",
        json!({ "name": "Mathematics", "day": "Monday", "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11a",
        "lessons.list",
        json!({ "classId": class_id }),
    );

    let _ = request(&mut stdin, &mut reader, "12", "grades.reconcile", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "classes.delete",
        json!({ "classId": class_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_method_reports_not_implemented() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let payload = json!({ "id": "x", "method": "nope.nothing", "params": {} });
    writeln!(stdin, "{}", payload).expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn mutations_validate_required_fields() {
    let workspace = temp_dir("schoold-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Missing required fields -> bad_params.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "announcements.create",
        json!({ "title": "no body or date" }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    // Dangling references -> not_found.
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "2D", "gradeId": "no-such-grade" }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );

    // A list with no query is a list, not an error.
    let resp = request(&mut stdin, &mut reader, "4", "students.list", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));

    // A patch carrying an explicit empty string is rejected outright, not
    // partially applied: the capacity edit beside it must not go through.
    let _ = request(&mut stdin, &mut reader, "5", "admin.seed", json!({}));
    let classes = request(
        &mut stdin,
        &mut reader,
        "6",
        "classes.list",
        json!({ "search": "1A" }),
    );
    let class_1a = result_of(&classes)
        .get("classes")
        .and_then(|v| v.as_array())
        .and_then(|a| {
            a.iter()
                .find(|c| c.get("name").and_then(|v| v.as_str()) == Some("1A"))
        })
        .cloned()
        .expect("class 1A");
    let class_id = class_1a
        .get("id")
        .and_then(|v| v.as_str())
        .expect("class id")
        .to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "7",
        "classes.update",
        json!({ "classId": class_id, "patch": { "name": "", "capacity": 5 } }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let classes = request(
        &mut stdin,
        &mut reader,
        "8",
        "classes.list",
        json!({ "search": "1A" }),
    );
    let class_1a = result_of(&classes)
        .get("classes")
        .and_then(|v| v.as_array())
        .and_then(|a| {
            a.iter()
                .find(|c| c.get("id").and_then(|v| v.as_str()) == Some(class_id.as_str()))
        })
        .cloned()
        .expect("class 1A after rejected patch");
    assert_eq!(class_1a.get("name").and_then(|v| v.as_str()), Some("1A"));
    assert_eq!(class_1a.get("capacity").and_then(|v| v.as_i64()), Some(20));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
