use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{f64_param, like_pattern, row_exists, str_param};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value};
use serde_json::json;
use uuid::Uuid;

fn handle_reports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut sql = String::from(
        "SELECT r.id, r.student_id, r.exam, r.score, s.last_name, s.first_name
         FROM reports r
         JOIN students s ON s.id = r.student_id",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(student_id) = str_param(&req.params, "studentId") {
        clauses.push("r.student_id = ?");
        params.push(Value::Text(student_id));
    }
    if let Some(exam) = str_param(&req.params, "exam") {
        clauses.push("r.exam LIKE ? ESCAPE '\\'");
        params.push(Value::Text(like_pattern(&exam)));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY r.exam, s.last_name, s.first_name");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            let student_id: String = row.get(1)?;
            let exam: String = row.get(2)?;
            let score: f64 = row.get(3)?;
            let last_name: String = row.get(4)?;
            let first_name: String = row.get(5)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "exam": exam,
                "score": score,
                "studentLastName": last_name,
                "studentFirstName": first_name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(reports) => ok(&req.id, json!({ "reports": reports })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_reports_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(student_id) = str_param(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(exam) = str_param(&req.params, "exam") else {
        return err(&req.id, "bad_params", "missing exam", None);
    };
    let Some(score) = f64_param(&req.params, "score") else {
        return err(&req.id, "bad_params", "missing score", None);
    };
    if !score.is_finite() || score < 0.0 {
        return err(&req.id, "bad_params", "score must be a non-negative number", None);
    }

    match row_exists(conn, "students", &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let report_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO reports(id, student_id, exam, score) VALUES(?, ?, ?, ?)",
        (&report_id, &student_id, &exam, score),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "reports" })),
        );
    }

    ok(
        &req.id,
        json!({
            "report": {
                "id": report_id,
                "studentId": student_id,
                "exam": exam,
                "score": score
            }
        }),
    )
}

fn handle_reports_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(report_id) = str_param(&req.params, "reportId") else {
        return err(&req.id, "bad_params", "missing reportId", None);
    };

    match conn.execute("DELETE FROM reports WHERE id = ?", [&report_id]) {
        Ok(0) => err(&req.id, "not_found", "report not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "reports" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.list" => Some(handle_reports_list(state, req)),
        "reports.create" => Some(handle_reports_create(state, req)),
        "reports.delete" => Some(handle_reports_delete(state, req)),
        _ => None,
    }
}
