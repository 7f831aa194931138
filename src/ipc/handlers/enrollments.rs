use crate::enrollments::{self, EnrollmentFilter};
use crate::error::Result;
use crate::ipc::helpers::{payload, required_f64, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::rules;
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let filter: EnrollmentFilter = payload(&req.params)?;
    Ok(json!({ "enrollments": enrollments::list(conn, &filter)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let today = state.today();
    let conn = state.conn()?;
    let student_id = required_str(&req.params, "studentId")?;
    let group_id = required_str(&req.params, "groupId")?;
    let rules = rules::load(conn)?;
    let enrollment = enrollments::create(conn, &rules, today, &student_id, &group_id)?;
    Ok(json!({ "enrollment": enrollment }))
}

fn handle_set_grade(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "enrollmentId")?;
    let grade = required_f64(&req.params, "grade")?;
    let rules = rules::load(conn)?;
    Ok(json!({ "enrollment": enrollments::set_grade(conn, &rules, &id, grade)? }))
}

fn handle_drop(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "enrollmentId")?;
    Ok(json!({ "enrollment": enrollments::drop(conn, &id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "enrollments.list" => handle_list(state, req),
        "enrollments.create" => handle_create(state, req),
        "enrollments.setGrade" => handle_set_grade(state, req),
        "enrollments.drop" => handle_drop(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
