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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
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

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u32,
}

impl Sidecar {
    fn start(workspace: &PathBuf) -> Self {
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Sidecar {
            child,
            stdin,
            reader,
            next_id: 0,
        };
        let resp = s.call(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        result_of(&resp);
        s
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn finish(self) {
        drop(self.stdin);
        let mut child = self.child;
        let _ = child.wait();
    }

    fn grade_id_for_level(&mut self, level: i64) -> String {
        let grades = self.call("grades.list", json!({}));
        result_of(&grades)
            .get("grades")
            .and_then(|v| v.as_array())
            .expect("grades array")
            .iter()
            .find(|g| g.get("level").and_then(|v| v.as_i64()) == Some(level))
            .and_then(|g| g.get("id"))
            .and_then(|v| v.as_str())
            .expect("grade for level")
            .to_string()
    }

    fn class_by_name(&mut self, name: &str) -> serde_json::Value {
        let classes = self.call("classes.list", json!({ "search": name }));
        result_of(&classes)
            .get("classes")
            .and_then(|v| v.as_array())
            .expect("classes array")
            .iter()
            .find(|c| c.get("name").and_then(|v| v.as_str()) == Some(name))
            .cloned()
            .expect("class by name")
    }
}

#[test]
fn seed_then_reconcile_round_trip() {
    let workspace = temp_dir("schoold-seed-reconcile");
    let mut s = Sidecar::start(&workspace);

    let seeded = s.call("admin.seed", json!({}));
    let seed_result = result_of(&seeded);
    assert_eq!(seed_result.get("grades").and_then(|v| v.as_i64()), Some(13));
    assert_eq!(seed_result.get("classes").and_then(|v| v.as_i64()), Some(78));

    // Freshly seeded data already satisfies the name/level invariant.
    let first = s.call("grades.reconcile", json!({}));
    let first = result_of(&first).clone();
    assert_eq!(first.get("checked").and_then(|v| v.as_i64()), Some(78));
    assert_eq!(first.get("fixed").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(first.get("matched").and_then(|v| v.as_i64()), Some(78));

    // Drift: repoint "2D" at the level-3 grade.
    let class_2d = s.class_by_name("2D");
    let class_2d_id = class_2d
        .get("id")
        .and_then(|v| v.as_str())
        .expect("class id")
        .to_string();
    let grade3 = s.grade_id_for_level(3);
    let updated = s.call(
        "classes.update",
        json!({ "classId": class_2d_id, "patch": { "gradeId": grade3 } }),
    );
    result_of(&updated);

    let fix_pass = s.call("grades.reconcile", json!({}));
    let fix_pass = result_of(&fix_pass).clone();
    assert_eq!(fix_pass.get("fixed").and_then(|v| v.as_i64()), Some(1));
    let class_2d = s.class_by_name("2D");
    assert_eq!(class_2d.get("gradeLevel").and_then(|v| v.as_i64()), Some(2));

    // Immediately re-running finds nothing left to fix.
    let second = s.call("grades.reconcile", json!({}));
    let second = result_of(&second).clone();
    assert_eq!(second.get("fixed").and_then(|v| v.as_i64()), Some(0));

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reconcile_skips_invalid_section_letter() {
    let workspace = temp_dir("schoold-skip-invalid");
    let mut s = Sidecar::start(&workspace);

    result_of(&s.call("admin.seed", json!({})));
    let grade7 = s.grade_id_for_level(7);
    let created = s.call(
        "classes.create",
        json!({ "name": "7Z", "gradeId": grade7 }),
    );
    result_of(&created);

    let pass = s.call("grades.reconcile", json!({}));
    let pass = result_of(&pass).clone();
    assert_eq!(pass.get("checked").and_then(|v| v.as_i64()), Some(79));
    assert_eq!(
        pass.get("skippedUnparseable").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(pass.get("fixed").and_then(|v| v.as_i64()), Some(0));

    // The invalid class keeps the grade it was created with.
    let class_7z = s.class_by_name("7Z");
    assert_eq!(class_7z.get("gradeLevel").and_then(|v| v.as_i64()), Some(7));

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reseeding_discards_prior_data_and_restores_counts() {
    let workspace = temp_dir("schoold-reseed");
    let mut s = Sidecar::start(&workspace);

    result_of(&s.call("admin.seed", json!({})));

    // Populate a dependent record, then reset.
    let class_1a = s.class_by_name("1A");
    let class_1a_id = class_1a
        .get("id")
        .and_then(|v| v.as_str())
        .expect("class id")
        .to_string();
    let student = s.call(
        "students.create",
        json!({ "classId": class_1a_id, "lastName": "Ngubane", "firstName": "Thandi" }),
    );
    result_of(&student);

    let reseeded = s.call("admin.seed", json!({}));
    let reseed_result = result_of(&reseeded);
    assert_eq!(reseed_result.get("grades").and_then(|v| v.as_i64()), Some(13));
    assert_eq!(
        reseed_result.get("classes").and_then(|v| v.as_i64()),
        Some(78)
    );

    let students = s.call("students.list", json!({}));
    assert_eq!(
        result_of(&students)
            .get("students")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
