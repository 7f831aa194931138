mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, str_at};

fn course(student_id: &str, level: u8, cost: f64) -> serde_json::Value {
    json!({
        "studentId": student_id,
        "name": format!("Intensive English {}", level),
        "englishLevel": level,
        "startDate": "2026-03-01",
        "endDate": "2026-04-30",
        "cost": cost,
    })
}

#[test]
fn rejected_payment_can_be_resubmitted() {
    let mut sc = spawn_sidecar();
    sc.open_workspace("schoold-payments");
    let sid = sc.create_student("C-1");

    let created = sc.request_ok("specialCourses.create", course(&sid, 1, 1200.0));
    assert_eq!(created["specialCourse"]["activity"]["status"], "pending_payment");
    assert_eq!(created["specialCourse"]["activity"]["code"], "SPC-2026-0001");
    let id = str_at(&created, "/specialCourse/activity/id");

    // Approval needs a submitted payment.
    let resp = sc.request("activities.approvePayment", json!({ "activityId": id }));
    assert_eq!(resp["error"]["code"], "invalid_transition");
    assert_eq!(resp["error"]["details"]["from"], "pending_payment");
    assert_eq!(resp["error"]["details"]["to"], "approved");

    assert_eq!(
        sc.request_err("activities.submitPayment", json!({ "activityId": id, "reference": "  " })),
        "bad_params"
    );
    let submitted = sc.request_ok(
        "activities.submitPayment",
        json!({ "activityId": id, "reference": "REF-1" }),
    );
    assert_eq!(submitted["activity"]["status"], "payment_review");
    assert_eq!(submitted["activity"]["paymentReference"], "REF-1");

    let rejected = sc.request_ok(
        "activities.rejectPayment",
        json!({ "activityId": id, "reason": "illegible receipt" }),
    );
    assert_eq!(rejected["activity"]["status"], "rejected");
    assert_eq!(rejected["activity"]["rejectionReason"], "illegible receipt");

    sc.request_ok(
        "activities.submitPayment",
        json!({ "activityId": id, "reference": "REF-2" }),
    );
    sc.request_ok("activities.approvePayment", json!({ "activityId": id }));
    sc.request_ok("activities.start", json!({ "activityId": id }));

    // Started courses end in a grade, not a cancellation.
    assert_eq!(
        sc.request_err("activities.cancel", json!({ "activityId": id })),
        "invalid_transition"
    );
    let graded = sc.request_ok("activities.setGrade", json!({ "activityId": id, "grade": 55 }));
    assert_eq!(graded["activity"]["status"], "failed");

    let history = sc.request_ok("activities.history", json!({ "activityId": id }));
    let path: Vec<&str> = history["history"]
        .as_array()
        .expect("history")
        .iter()
        .filter_map(|h| h["toStatus"].as_str())
        .collect();
    assert_eq!(
        path,
        vec![
            "pending_payment",
            "payment_review",
            "rejected",
            "payment_review",
            "approved",
            "in_progress",
            "failed"
        ]
    );

    // A failed level can be retaken.
    let retry = sc.request_ok("specialCourses.create", course(&sid, 1, 0.0));
    assert_eq!(retry["specialCourse"]["activity"]["status"], "approved");
    assert_eq!(retry["specialCourse"]["activity"]["code"], "SPC-2026-0002");
}

#[test]
fn cancelling_frees_the_english_slot() {
    let mut sc = spawn_sidecar();
    sc.open_workspace("schoold-cancel");
    let sid = sc.create_student("C-2");

    let first = sc.request_ok("specialCourses.create", course(&sid, 1, 300.0));
    let id = str_at(&first, "/specialCourse/activity/id");
    assert_eq!(
        sc.request_err("specialCourses.create", course(&sid, 1, 300.0)),
        "english_activity_open"
    );

    let cancelled = sc.request_ok(
        "activities.cancel",
        json!({ "activityId": id, "reason": "schedule clash" }),
    );
    assert_eq!(cancelled["activity"]["status"], "cancelled");
    assert_eq!(
        sc.request_err("activities.submitPayment", json!({ "activityId": id, "reference": "X" })),
        "invalid_transition"
    );

    sc.request_ok("specialCourses.create", course(&sid, 1, 300.0));
    let listed = sc.request_ok("specialCourses.list", json!({ "status": "pending_payment" }));
    assert_eq!(listed["specialCourses"].as_array().map(|a| a.len()), Some(1));

    let all = sc.request_ok("activities.list", json!({ "studentId": sid, "kind": "special_course" }));
    assert_eq!(all["activities"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(
        sc.request_err("activities.list", json!({ "studentId": sid, "kind": "workshop" })),
        "bad_params"
    );
}
