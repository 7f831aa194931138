use crate::error::Result;
use crate::ipc::helpers::{payload, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::special_courses::{self, NewSpecialCourse, SpecialCourseFilter};
use serde_json::{json, Value};

fn handle_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let today = state.today();
    let conn = state.conn()?;
    let new: NewSpecialCourse = payload(&req.params)?;
    Ok(json!({ "specialCourse": special_courses::create(conn, today, new)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    Ok(json!({ "specialCourse": special_courses::get(conn, &id)? }))
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let filter: SpecialCourseFilter = payload(&req.params)?;
    Ok(json!({ "specialCourses": special_courses::list(conn, &filter)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "specialCourses.create" => handle_create(state, req),
        "specialCourses.get" => handle_get(state, req),
        "specialCourses.list" => handle_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
