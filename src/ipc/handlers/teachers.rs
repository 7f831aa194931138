use crate::error::Result;
use crate::ipc::helpers::{payload, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::teachers::{self, NewTeacher, TeacherPatch};
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let active_only = req
        .params
        .get("activeOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    Ok(json!({ "teachers": teachers::list(conn, active_only)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "teacherId")?;
    Ok(json!({ "teacher": teachers::get(conn, &id)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let new: NewTeacher = payload(&req.params)?;
    Ok(json!({ "teacher": teachers::create(conn, new)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "teacherId")?;
    let patch: TeacherPatch = payload(&req.params)?;
    Ok(json!({ "teacher": teachers::update(conn, &id, patch)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "teacherId")?;
    teachers::delete(conn, &id)?;
    Ok(json!({ "deleted": true, "teacherId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "teachers.list" => handle_list(state, req),
        "teachers.get" => handle_get(state, req),
        "teachers.create" => handle_create(state, req),
        "teachers.update" => handle_update(state, req),
        "teachers.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
