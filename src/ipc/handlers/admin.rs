use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::jobs;
use serde_json::json;

/// Destructive reference-data reset over IPC. Same routine the `seed`
/// subcommand runs; the host shell is expected to confirm with the user
/// before calling this.
fn handle_admin_seed(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match jobs::seed_reference_data(conn) {
        Ok(summary) => match serde_json::to_value(summary) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => err(
            &req.id,
            "seed_failed",
            e.to_string(),
            Some(json!({ "hint": "no partial writes; the transaction rolled back" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.seed" => Some(handle_admin_seed(state, req)),
        _ => None,
    }
}
