use crate::error::Result;
use crate::groups::{self, GroupFilter, GroupPatch, NewGroup};
use crate::ipc::helpers::{payload, required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let filter: GroupFilter = payload(&req.params)?;
    Ok(json!({ "groups": groups::list(conn, &filter)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "groupId")?;
    Ok(json!({ "group": groups::get(conn, &id)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let new: NewGroup = payload(&req.params)?;
    Ok(json!({ "group": groups::create(conn, new)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "groupId")?;
    let patch: GroupPatch = payload(&req.params)?;
    Ok(json!({ "group": groups::update(conn, &id, patch)? }))
}

fn handle_close(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "groupId")?;
    Ok(json!({ "group": groups::close(conn, &id)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "groupId")?;
    groups::delete(conn, &id)?;
    Ok(json!({ "deleted": true, "groupId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "groups.list" => handle_list(state, req),
        "groups.get" => handle_get(state, req),
        "groups.create" => handle_create(state, req),
        "groups.update" => handle_update(state, req),
        "groups.close" => handle_close(state, req),
        "groups.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
