mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, TODAY};

#[test]
fn health_answers_without_a_workspace() {
    let mut sc = spawn_sidecar();
    let res = sc.request_ok("health", json!({}));
    assert_eq!(res["today"], TODAY);
    assert!(res["workspacePath"].is_null());
    assert!(res["version"].as_str().is_some());
}

#[test]
fn data_methods_require_a_workspace() {
    let mut sc = spawn_sidecar();
    assert_eq!(sc.request_err("students.list", json!({})), "no_workspace");
    assert_eq!(sc.request_err("rules.get", json!({})), "no_workspace");
}

#[test]
fn unknown_method_and_bad_input_are_reported() {
    let mut sc = spawn_sidecar();
    assert_eq!(sc.request_err("students.teleport", json!({})), "not_implemented");
    assert_eq!(sc.request_err("workspace.select", json!({})), "bad_params");

    let raw = sc.send_raw("{not json");
    assert_eq!(raw["ok"], false);
    assert_eq!(raw["error"]["code"], "bad_json");

    // The loop keeps serving after a malformed line.
    sc.request_ok("health", json!({}));
}

#[test]
fn workspace_persists_across_restarts() {
    let mut sc = spawn_sidecar();
    let workspace = sc.open_workspace("schoold-restart");
    sc.create_student("C-100");
    drop(sc);

    let ws = workspace.to_string_lossy().to_string();
    let mut sc = test_support::spawn_sidecar_with_env(&[("SCHOOLD_WORKSPACE", ws.as_str())]);
    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["workspacePath"], ws.as_str());
    let listed = sc.request_ok("students.list", json!({}));
    let students = listed["students"].as_array().expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["controlNumber"], "C-100");
}

#[test]
fn rules_round_trip_and_reject_unknown_fields() {
    let mut sc = spawn_sidecar();
    sc.open_workspace("schoold-rules");
    let rules = sc.request_ok("rules.get", json!({}));
    assert_eq!(rules["rules"]["passingGrade"], 70.0);

    let updated = sc.request_ok("rules.update", json!({ "patch": { "passingGrade": 60 } }));
    assert_eq!(updated["rules"]["passingGrade"], 60.0);
    assert_eq!(
        sc.request_err("rules.update", json!({ "patch": { "curve": true } })),
        "bad_params"
    );
    let again = sc.request_ok("rules.get", json!({}));
    assert_eq!(again["rules"]["passingGrade"], 60.0);
}
