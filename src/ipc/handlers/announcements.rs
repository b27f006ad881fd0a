use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{like_pattern, patch_str, row_exists, str_param};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn announcement_record(
    conn: &Connection,
    announcement_id: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT id, title, body, date, class_id FROM announcements WHERE id = ?",
        [announcement_id],
        |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let body: String = row.get(2)?;
            let date: String = row.get(3)?;
            let class_id: Option<String> = row.get(4)?;
            Ok(json!({
                "id": id,
                "title": title,
                "body": body,
                "date": date,
                "classId": class_id
            }))
        },
    )
    .optional()
}

fn handle_announcements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // No search query means the full list, newest first. Never an error.
    let mut sql =
        String::from("SELECT id, title, body, date, class_id FROM announcements");
    let mut params: Vec<Value> = Vec::new();
    if let Some(search) = str_param(&req.params, "search") {
        sql.push_str(" WHERE title LIKE ? ESCAPE '\\'");
        params.push(Value::Text(like_pattern(&search)));
    }
    sql.push_str(" ORDER BY date DESC, id");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let body: String = row.get(2)?;
            let date: String = row.get(3)?;
            let class_id: Option<String> = row.get(4)?;
            Ok(json!({
                "id": id,
                "title": title,
                "body": body,
                "date": date,
                "classId": class_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(announcements) => ok(&req.id, json!({ "announcements": announcements })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_announcements_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(title) = str_param(&req.params, "title") else {
        return err(&req.id, "bad_params", "missing title", None);
    };
    let Some(body) = str_param(&req.params, "body") else {
        return err(&req.id, "bad_params", "missing body", None);
    };
    let Some(date) = str_param(&req.params, "date") else {
        return err(&req.id, "bad_params", "missing date", None);
    };
    let class_id = str_param(&req.params, "classId");
    if let Some(ref cid) = class_id {
        match row_exists(conn, "classes", cid) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "class not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let announcement_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO announcements(id, title, body, date, class_id) VALUES(?, ?, ?, ?, ?)",
        (&announcement_id, &title, &body, &date, &class_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "announcements" })),
        );
    }

    match announcement_record(conn, &announcement_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "announcement": record })),
        Ok(None) => err(&req.id, "not_found", "announcement vanished after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_announcements_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(announcement_id) = str_param(&req.params, "announcementId") else {
        return err(&req.id, "bad_params", "missing announcementId", None);
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    match row_exists(conn, "announcements", &announcement_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "announcement not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    for (column, key) in [("title = ?", "title"), ("body = ?", "body"), ("date = ?", "date")] {
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

    let sql = format!("UPDATE announcements SET {} WHERE id = ?", sets.join(", "));
    params.push(Value::Text(announcement_id.clone()));
    if let Err(e) = conn.execute(&sql, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "announcements" })),
        );
    }

    match announcement_record(conn, &announcement_id) {
        Ok(Some(record)) => ok(&req.id, json!({ "announcement": record })),
        Ok(None) => err(&req.id, "not_found", "announcement not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_announcements_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(announcement_id) = str_param(&req.params, "announcementId") else {
        return err(&req.id, "bad_params", "missing announcementId", None);
    };

    match conn.execute("DELETE FROM announcements WHERE id = ?", [&announcement_id]) {
        Ok(0) => err(&req.id, "not_found", "announcement not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "announcements" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "announcements.list" => Some(handle_announcements_list(state, req)),
        "announcements.create" => Some(handle_announcements_create(state, req)),
        "announcements.update" => Some(handle_announcements_update(state, req)),
        "announcements.delete" => Some(handle_announcements_delete(state, req)),
        _ => None,
    }
}
