use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{like_pattern, patch_str, row_exists, str_param};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn event_record(conn: &Connection, event_id: &str) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT id, title, body, start_time, end_time, class_id FROM events WHERE id = ?",
        [event_id],
        |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let body: String = row.get(2)?;
            let start_time: String = row.get(3)?;
            let end_time: String = row.get(4)?;
            let class_id: Option<String> = row.get(5)?;
            Ok(json!({
                "id": id,
                "title": title,
                "body": body,
                "startTime": start_time,
                "endTime": end_time,
                "classId": class_id
            }))
        },
    )
    .optional()
}

fn handle_events_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut sql =
        String::from("SELECT id, title, body, start_time, end_time, class_id FROM events");
    let mut params: Vec<Value> = Vec::new();
    if let Some(search) = str_param(&req.params, "search") {
        sql.push_str(" WHERE title LIKE ? ESCAPE '\\'");
        params.push(Value::Text(like_pattern(&search)));
    }
    sql.push_str(" ORDER BY start_time, id");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let body: String = row.get(2)?;
            let start_time: String = row.get(3)?;
            let end_time: String = row.get(4)?;
            let class_id: Option<String> = row.get(5)?;
            Ok(json!({
                "id": id,
                "title": title,
                "body": body,
                "startTime": start_time,
                "endTime": end_time,
                "classId": class_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(events) => ok(&req.id, json!({ "events": events })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_events_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(title) = str_param(&req.params, "title") else {
        return err(&req.id, "bad_params", "missing title", None);
    };
    let Some(body) = str_param(&req.params, "body") else {
        return err(&req.id, "bad_params", "missing body", None);
    };
    let Some(start_time) = str_param(&req.params, "startTime") else {
        return err(&req.id, "bad_params", "missing startTime", None);
    };
    let Some(end_time) = str_param(&req.params, "endTime") else {
        return err(&req.id, "bad_params", "missing endTime", None);
    };
    let class_id = str_param(&req.params, "classId");
    if let Some(ref cid) = class_id {
        match row_exists(conn, "classes", cid) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "class not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let event_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO events(id, title, body, start_time, end_time, class_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&event_id, &title, &body, &start_time, &end_time, &class_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "events" })),
        );
    }

    match event_record(conn, &event_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "event": record })),
        Ok(None) => err(&req.id, "not_found", "event vanished after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_events_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(event_id) = str_param(&req.params, "eventId") else {
        return err(&req.id, "bad_params", "missing eventId", None);
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    match row_exists(conn, "events", &event_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "event not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    for (column, key) in [
        ("title = ?", "title"),
        ("body = ?", "body"),
        ("start_time = ?", "startTime"),
        ("end_time = ?", "endTime"),
    ] {
        match patch_str(patch, key) {
            Ok(Some(value)) => {
                sets.push(column);
                params.push(Value::Text(value));
            }
            Ok(None) => {}
            Err(m) => return err(&req.id, "bad_params", m, None),
        }
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "empty patch", None);
    }

    let sql = format!("UPDATE events SET {} WHERE id = ?", sets.join(", "));
    params.push(Value::Text(event_id.clone()));
    if let Err(e) = conn.execute(&sql, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "events" })),
        );
    }

    match event_record(conn, &event_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "event": record })),
        Ok(None) => err(&req.id, "not_found", "event not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_events_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(event_id) = str_param(&req.params, "eventId") else {
        return err(&req.id, "bad_params", "missing eventId", None);
    };

    match conn.execute("DELETE FROM events WHERE id = ?", [&event_id]) {
        Ok(0) => err(&req.id, "not_found", "event not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "events" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.list" => Some(handle_events_list(state, req)),
        "events.create" => Some(handle_events_create(state, req)),
        "events.update" => Some(handle_events_update(state, req)),
        "events.delete" => Some(handle_events_delete(state, req)),
        _ => None,
    }
}
