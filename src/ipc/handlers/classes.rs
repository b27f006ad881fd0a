use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{i64_param, like_pattern, patch_str, row_exists, str_param};
use crate::ipc::types::{AppState, Request};
use crate::jobs::DEFAULT_CLASS_CAPACITY;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn class_record(conn: &Connection, class_id: &str) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT c.id, c.name, c.capacity, c.grade_id, g.level
         FROM classes c JOIN grades g ON g.id = c.grade_id
         WHERE c.id = ?",
        [class_id],
        |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let capacity: i64 = row.get(2)?;
            let grade_id: String = row.get(3)?;
            let level: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "capacity": capacity,
                "gradeId": grade_id,
                "gradeLevel": level
            }))
        },
    )
    .optional()
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Include student counts so the dashboard list is useful on its own.
    let mut sql = String::from(
        "SELECT
           c.id,
           c.name,
           c.capacity,
           c.grade_id,
           g.level,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
         FROM classes c
         JOIN grades g ON g.id = c.grade_id",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(grade_id) = str_param(&req.params, "gradeId") {
        clauses.push("c.grade_id = ?");
        params.push(Value::Text(grade_id));
    }
    if let Some(search) = str_param(&req.params, "search") {
        clauses.push("c.name LIKE ? ESCAPE '\\'");
        params.push(Value::Text(like_pattern(&search)));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY g.level, c.name");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let capacity: i64 = row.get(2)?;
            let grade_id: String = row.get(3)?;
            let level: i64 = row.get(4)?;
            let student_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "capacity": capacity,
                "gradeId": grade_id,
                "gradeLevel": level,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(name) = str_param(&req.params, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(grade_id) = str_param(&req.params, "gradeId") else {
        return err(&req.id, "bad_params", "missing gradeId", None);
    };
    let capacity = i64_param(&req.params, "capacity").unwrap_or(DEFAULT_CLASS_CAPACITY);
    if capacity <= 0 {
        return err(&req.id, "bad_params", "capacity must be positive", None);
    }

    match row_exists(conn, "grades", &grade_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "grade not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, capacity, grade_id) VALUES(?, ?, ?, ?)",
        (&class_id, &name, capacity, &grade_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    match class_record(conn, &class_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "class": record })),
        Ok(None) => err(&req.id, "not_found", "class vanished after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(class_id) = str_param(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    match row_exists(conn, "classes", &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    let name = match patch_str(patch, "name") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Some(name) = name {
        sets.push("name = ?");
        params.push(Value::Text(name));
    }
    if let Some(capacity) = i64_param(patch, "capacity") {
        if capacity <= 0 {
            return err(&req.id, "bad_params", "capacity must be positive", None);
        }
        sets.push("capacity = ?");
        params.push(Value::Integer(capacity));
    }
    let grade_id = match patch_str(patch, "gradeId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Some(grade_id) = grade_id {
        match row_exists(conn, "grades", &grade_id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "grade not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
        sets.push("grade_id = ?");
        params.push(Value::Text(grade_id));
    }

    if sets.is_empty() {
        return err(&req.id, "bad_params", "empty patch", None);
    }

    let sql = format!("UPDATE classes SET {} WHERE id = ?", sets.join(", "));
    params.push(Value::Text(class_id.clone()));
    if let Err(e) = conn.execute(&sql, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    match class_record(conn, &class_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "class": record })),
        Ok(None) => err(&req.id, "not_found", "class not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(class_id) = str_param(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };

    match row_exists(conn, "classes", &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicit dependency order (no ON DELETE CASCADE). Announcements and
    // events keep their rows, losing only the class link.
    let steps: [(&str, &str); 6] = [
        (
            "reports",
            "DELETE FROM reports
             WHERE student_id IN (SELECT id FROM students WHERE class_id = ?)",
        ),
        ("lessons", "DELETE FROM lessons WHERE class_id = ?"),
        (
            "announcements",
            "UPDATE announcements SET class_id = NULL WHERE class_id = ?",
        ),
        (
            "events",
            "UPDATE events SET class_id = NULL WHERE class_id = ?",
        ),
        ("students", "DELETE FROM students WHERE class_id = ?"),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ];

    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
