use crate::error::Result;
use crate::ipc::helpers::{payload, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::subjects::{self, NewSubject, SubjectPatch};
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let is_english = req.params.get("isEnglish").and_then(|v| v.as_bool());
    Ok(json!({ "subjects": subjects::list(conn, is_english)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "subjectId")?;
    Ok(json!({ "subject": subjects::get(conn, &id)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let new: NewSubject = payload(&req.params)?;
    Ok(json!({ "subject": subjects::create(conn, new)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "subjectId")?;
    let patch: SubjectPatch = payload(&req.params)?;
    Ok(json!({ "subject": subjects::update(conn, &id, patch)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "subjectId")?;
    subjects::delete(conn, &id)?;
    Ok(json!({ "deleted": true, "subjectId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "subjects.list" => handle_list(state, req),
        "subjects.get" => handle_get(state, req),
        "subjects.create" => handle_create(state, req),
        "subjects.update" => handle_update(state, req),
        "subjects.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
