use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

/// A string parameter: present, string-typed, non-empty after trimming.
/// At required call sites `None` becomes a bad_params error; at optional
/// ones it simply means "no filter given".
pub fn str_param(params: &Value, key: &str) -> Option<String> {
    let v = params.get(key)?.as_str()?.trim().to_string();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// A string field inside an update patch. Absent (or null) means "leave
/// unchanged"; a value that is present must be a non-empty string, so an
/// explicit `"name": ""` is rejected instead of silently dropped.
pub fn patch_str(patch: &Value, key: &str) -> Result<Option<String>, String> {
    let Some(v) = patch.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    match v.as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(Some(s.to_string())),
        _ => Err(format!("{key} must be a non-empty string")),
    }
}

pub fn i64_param(params: &Value, key: &str) -> Option<i64> {
    params.get(key)?.as_i64()
}

pub fn f64_param(params: &Value, key: &str) -> Option<f64> {
    params.get(key)?.as_f64()
}

pub fn bool_param(params: &Value, key: &str) -> Option<bool> {
    params.get(key)?.as_bool()
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    // `table` is always a literal from our own handlers, never user input.
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let hit: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

/// Case-insensitive substring pattern for LIKE. SQLite's LIKE is already
/// case-insensitive for ASCII; escaping keeps user input from acting as
/// wildcards.
pub fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
