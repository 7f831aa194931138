use crate::error::{Result, SchoolError};
use crate::ipc::helpers::respond;
use crate::ipc::types::{AppState, Request};
use crate::rules;
use serde_json::{json, Value};

fn handle_rules_get(state: &mut AppState, _req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    Ok(json!({ "rules": rules::load(conn)? }))
}

fn handle_rules_update(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(SchoolError::bad_params("patch must be an object"));
    };
    Ok(json!({ "rules": rules::update(conn, patch)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "rules.get" => handle_rules_get(state, req),
        "rules.update" => handle_rules_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
