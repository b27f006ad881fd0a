use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{bool_param, like_pattern, patch_str, row_exists, str_param};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn student_record(
    conn: &Connection,
    student_id: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT id, class_id, last_name, first_name, active, updated_at
         FROM students WHERE id = ?",
        [student_id],
        |row| {
            let id: String = row.get(0)?;
            let class_id: String = row.get(1)?;
            let last_name: String = row.get(2)?;
            let first_name: String = row.get(3)?;
            let active: i64 = row.get(4)?;
            let updated_at: Option<String> = row.get(5)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "lastName": last_name,
                "firstName": first_name,
                "active": active != 0,
                "updatedAt": updated_at
            }))
        },
    )
    .optional()
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut sql = String::from(
        "SELECT id, class_id, last_name, first_name, active, updated_at FROM students",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(class_id) = str_param(&req.params, "classId") {
        clauses.push("class_id = ?");
        params.push(Value::Text(class_id));
    }
    if let Some(search) = str_param(&req.params, "search") {
        clauses.push("(last_name LIKE ? ESCAPE '\\' OR first_name LIKE ? ESCAPE '\\')");
        let pattern = like_pattern(&search);
        params.push(Value::Text(pattern.clone()));
        params.push(Value::Text(pattern));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY last_name, first_name");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            let class_id: String = row.get(1)?;
            let last_name: String = row.get(2)?;
            let first_name: String = row.get(3)?;
            let active: i64 = row.get(4)?;
            let updated_at: Option<String> = row.get(5)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "lastName": last_name,
                "firstName": first_name,
                "active": active != 0,
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(class_id) = str_param(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let Some(last_name) = str_param(&req.params, "lastName") else {
        return err(&req.id, "bad_params", "missing lastName", None);
    };
    let Some(first_name) = str_param(&req.params, "firstName") else {
        return err(&req.id, "bad_params", "missing firstName", None);
    };
    let active = bool_param(&req.params, "active").unwrap_or(true);

    match row_exists(conn, "classes", &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, active, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &class_id,
            &last_name,
            &first_name,
            active as i64,
            Utc::now().to_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    match student_record(conn, &student_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "student": record })),
        Ok(None) => err(&req.id, "not_found", "student vanished after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(student_id) = str_param(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    match row_exists(conn, "students", &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    let last_name = match patch_str(patch, "lastName") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Some(last_name) = last_name {
        sets.push("last_name = ?");
        params.push(Value::Text(last_name));
    }
    let first_name = match patch_str(patch, "firstName") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Some(first_name) = first_name {
        sets.push("first_name = ?");
        params.push(Value::Text(first_name));
    }
    if let Some(active) = bool_param(patch, "active") {
        sets.push("active = ?");
        params.push(Value::Integer(active as i64));
    }
    let class_id = match patch_str(patch, "classId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Some(class_id) = class_id {
        match row_exists(conn, "classes", &class_id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "class not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
        sets.push("class_id = ?");
        params.push(Value::Text(class_id));
    }

    if sets.is_empty() {
        return err(&req.id, "bad_params", "empty patch", None);
    }

    sets.push("updated_at = ?");
    params.push(Value::Text(Utc::now().to_rfc3339()));

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    params.push(Value::Text(student_id.clone()));
    if let Err(e) = conn.execute(&sql, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    match student_record(conn, &student_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "student": record })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(student_id) = str_param(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    match row_exists(conn, "students", &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    for (table, sql) in [
        ("reports", "DELETE FROM reports WHERE student_id = ?"),
        ("students", "DELETE FROM students WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&student_id]) {
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
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
