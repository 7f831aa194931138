use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const FAMILIES: &[Handler] = &[
    handlers::core::try_handle,
    handlers::rules::try_handle,
    handlers::students::try_handle,
    handlers::teachers::try_handle,
    handlers::subjects::try_handle,
    handlers::groups::try_handle,
    handlers::enrollments::try_handle,
    handlers::activities::try_handle,
    handlers::special_courses::try_handle,
    handlers::exams::try_handle,
];

/// Methods that never write. Anything else that succeeds drops the English
/// status cache.
fn is_read_only(method: &str) -> bool {
    matches!(
        method,
        "health"
            | "rules.get"
            | "students.list"
            | "students.get"
            | "students.englishStatus"
            | "teachers.list"
            | "teachers.get"
            | "subjects.list"
            | "subjects.get"
            | "groups.list"
            | "groups.get"
            | "enrollments.list"
            | "activities.list"
            | "activities.get"
            | "activities.history"
            | "specialCourses.get"
            | "specialCourses.list"
            | "exams.get"
            | "exams.list"
    )
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    for try_handle in FAMILIES.iter().copied() {
        if let Some(resp) = try_handle(state, &req) {
            let succeeded = resp.get("ok").and_then(|v| v.as_bool()) == Some(true);
            if succeeded && !is_read_only(&req.method) && !state.english_cache.is_empty() {
                tracing::debug!(
                    method = %req.method,
                    entries = state.english_cache.len(),
                    "english cache cleared"
                );
                state.english_cache.clear();
            }
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
