use crate::error::Result;
use crate::exams::{self, ExamRequest};
use crate::ipc::helpers::{optional_i64, payload, required_f64, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::rules;
use serde_json::{json, Value};

fn handle_schedule(state: &mut AppState, req: &Request) -> Result<Value> {
    let today = state.today();
    let conn = state.conn()?;
    let request: ExamRequest = payload(&req.params)?;
    let rules = rules::load(conn)?;
    Ok(json!({ "exam": exams::schedule(conn, &rules, today, request)? }))
}

fn handle_record_result(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    let score = required_f64(&req.params, "score")?;
    let result_level = optional_i64(&req.params, "resultLevel")?;
    let rules = rules::load(conn)?;
    Ok(json!({ "exam": exams::record_result(conn, &rules, &id, score, result_level)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    Ok(json!({ "exam": exams::get(conn, &id)? }))
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let student_id = required_str(&req.params, "studentId")?;
    Ok(json!({ "exams": exams::list_for_student(conn, &student_id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "exams.schedule" => handle_schedule(state, req),
        "exams.recordResult" => handle_record_result(state, req),
        "exams.get" => handle_get(state, req),
        "exams.list" => handle_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
