use crate::activities::{self, ActivityKind};
use crate::error::{Result, SchoolError};
use crate::ipc::helpers::{optional_str, required_f64, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::{exams, rules, special_courses};
use rusqlite::Connection;
use serde_json::{json, Value};

/// The kind-specific row next to the activity itself.
fn detail(conn: &Connection, id: &str, kind: ActivityKind) -> Result<Value> {
    let v = match kind {
        ActivityKind::Enrollment => json!(activities::group_enrollment_detail(conn, id)?),
        ActivityKind::SpecialCourse => {
            let c = special_courses::get(conn, id)?;
            json!({
                "name": c.name,
                "englishLevel": c.english_level,
                "startDate": c.start_date,
                "endDate": c.end_date,
                "finalGrade": c.final_grade,
            })
        }
        ActivityKind::Exam => {
            let e = exams::get(conn, id)?;
            json!({
                "examType": e.exam_type,
                "examDate": e.exam_date,
                "score": e.score,
                "resultLevel": e.result_level,
            })
        }
    };
    Ok(v)
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let student_id = required_str(&req.params, "studentId")?;
    let kind = match optional_str(&req.params, "kind") {
        None => None,
        Some(k) => Some(
            ActivityKind::parse(&k)
                .ok_or_else(|| SchoolError::bad_params(format!("unknown activity kind: {}", k)))?,
        ),
    };
    Ok(json!({ "activities": activities::list_for_student(conn, &student_id, kind)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    let activity = activities::get(conn, &id)?;
    let detail = detail(conn, &id, activity.kind)?;
    let history = activities::history(conn, &id)?;
    Ok(json!({ "activity": activity, "detail": detail, "history": history }))
}

fn handle_history(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    Ok(json!({ "history": activities::history(conn, &id)? }))
}

fn handle_enroll(state: &mut AppState, req: &Request) -> Result<Value> {
    let today = state.today();
    let conn = state.conn()?;
    let student_id = required_str(&req.params, "studentId")?;
    let group_id = required_str(&req.params, "groupId")?;
    let rules = rules::load(conn)?;
    let activity = activities::enroll_in_group(conn, &rules, today, &student_id, &group_id)?;
    Ok(json!({ "activity": activity }))
}

fn handle_submit_payment(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    let reference = required_str(&req.params, "reference")?;
    Ok(json!({ "activity": activities::submit_payment(conn, &id, &reference)? }))
}

fn handle_approve_payment(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    Ok(json!({ "activity": activities::approve_payment(conn, &id)? }))
}

fn handle_reject_payment(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    let reason = required_str(&req.params, "reason")?;
    Ok(json!({ "activity": activities::reject_payment(conn, &id, &reason)? }))
}

fn handle_start(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    Ok(json!({ "activity": activities::start(conn, &id)? }))
}

fn handle_cancel(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    let reason = optional_str(&req.params, "reason");
    Ok(json!({ "activity": activities::cancel(conn, &id, reason.as_deref())? }))
}

fn handle_set_grade(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(&req.params, "activityId")?;
    let grade = required_f64(&req.params, "grade")?;
    let rules = rules::load(conn)?;
    Ok(json!({ "activity": activities::set_grade(conn, &rules, &id, grade)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "activities.list" => handle_list(state, req),
        "activities.get" => handle_get(state, req),
        "activities.history" => handle_history(state, req),
        "activities.enroll" => handle_enroll(state, req),
        "activities.submitPayment" => handle_submit_payment(state, req),
        "activities.approvePayment" => handle_approve_payment(state, req),
        "activities.rejectPayment" => handle_reject_payment(state, req),
        "activities.start" => handle_start(state, req),
        "activities.cancel" => handle_cancel(state, req),
        "activities.setGrade" => handle_set_grade(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
