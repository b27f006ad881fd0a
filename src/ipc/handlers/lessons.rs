use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{row_exists, str_param};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value};
use serde_json::json;
use uuid::Uuid;

fn handle_lessons_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut sql = String::from(
        "SELECT l.id, l.name, l.day, l.class_id, c.name
         FROM lessons l
         JOIN classes c ON c.id = l.class_id",
    );
    let mut params: Vec<Value> = Vec::new();
    if let Some(class_id) = str_param(&req.params, "classId") {
        sql.push_str(" WHERE l.class_id = ?");
        params.push(Value::Text(class_id));
    }
    sql.push_str(" ORDER BY l.day, l.name");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let day: String = row.get(2)?;
            let class_id: String = row.get(3)?;
            let class_name: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "day": day,
                "classId": class_id,
                "className": class_name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(lessons) => ok(&req.id, json!({ "lessons": lessons })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(name) = str_param(&req.params, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(day) = str_param(&req.params, "day") else {
        return err(&req.id, "bad_params", "missing day", None);
    };
    let Some(class_id) = str_param(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };

    match row_exists(conn, "classes", &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let lesson_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO lessons(id, name, day, class_id) VALUES(?, ?, ?, ?)",
        (&lesson_id, &name, &day, &class_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }

    ok(
        &req.id,
        json!({
            "lesson": {
                "id": lesson_id,
                "name": name,
                "day": day,
                "classId": class_id
            }
        }),
    )
}

fn handle_lessons_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(lesson_id) = str_param(&req.params, "lessonId") else {
        return err(&req.id, "bad_params", "missing lessonId", None);
    };

    match conn.execute("DELETE FROM lessons WHERE id = ?", [&lesson_id]) {
        Ok(0) => err(&req.id, "not_found", "lesson not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lessons.list" => Some(handle_lessons_list(state, req)),
        "lessons.create" => Some(handle_lessons_create(state, req)),
        "lessons.delete" => Some(handle_lessons_delete(state, req)),
        _ => None,
    }
}
