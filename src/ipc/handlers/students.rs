use crate::english;
use crate::error::Result;
use crate::ipc::helpers::{payload, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::students::{self, NewStudent, StudentFilter, StudentPatch};
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let filter: StudentFilter = payload(&req.params)?;
    Ok(json!({ "students": students::list(conn, &filter)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "studentId")?;
    Ok(json!({ "student": students::get(conn, &id)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let new: NewStudent = payload(&req.params)?;
    Ok(json!({ "student": students::create(conn, new)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "studentId")?;
    let patch: StudentPatch = payload(&req.params)?;
    Ok(json!({ "student": students::update(conn, &id, patch)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "studentId")?;
    students::delete(conn, &id)?;
    Ok(json!({ "deleted": true, "studentId": id }))
}

/// Served from the cache when possible; the cache is dropped on any write.
fn handle_english_status(state: &mut AppState, req: &Request) -> Result<Value> {
    let id = required_str(&req.params, "studentId")?;
    if let Some(status) = state.english_cache.get(&id) {
        return Ok(json!({ "english": status, "cached": true }));
    }
    let status = english::english_status(state.conn()?, &id)?;
    state.english_cache.put(id, status.clone());
    Ok(json!({ "english": status, "cached": false }))
}

fn handle_recalculate(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "studentId")?;
    let tx = conn.unchecked_transaction()?;
    let summary = english::recalculate_student(&tx, &id)?;
    tx.commit()?;
    Ok(json!({ "summary": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_list(state, req),
        "students.get" => handle_get(state, req),
        "students.create" => handle_create(state, req),
        "students.update" => handle_update(state, req),
        "students.delete" => handle_delete(state, req),
        "students.englishStatus" => handle_english_status(state, req),
        "students.recalculate" => handle_recalculate(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
