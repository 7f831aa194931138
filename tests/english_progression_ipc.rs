mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, str_at};

#[test]
fn diagnostic_then_group_course_advances_levels() {
    let mut sc = spawn_sidecar();
    sc.open_workspace("schoold-english");
    let sid = sc.create_student("C-1");
    let eng3 = sc.create_subject("ENG3", Some(3));
    let eng5 = sc.create_subject("ENG5", Some(5));
    let g3 = sc.create_group(&eng3, "A", 20);
    let g5 = sc.create_group(&eng5, "A", 20);

    let exam = sc.request_ok(
        "exams.schedule",
        json!({ "studentId": sid, "examType": "diagnostic", "examDate": "2026-02-10" }),
    );
    assert_eq!(exam["exam"]["activity"]["status"], "approved");
    assert_eq!(exam["exam"]["activity"]["code"], "EXM-2026-0001");
    let exam_id = str_at(&exam, "/exam/activity/id");

    sc.request_ok(
        "exams.recordResult",
        json!({ "activityId": exam_id, "score": 64, "resultLevel": 2 }),
    );

    let status = sc.request_ok("students.englishStatus", json!({ "studentId": sid }));
    assert_eq!(status["english"]["completedLevels"], 2);
    assert_eq!(status["english"]["nextLevel"], 3);
    assert_eq!(status["english"]["diagnosticTaken"], true);
    assert_eq!(status["english"]["levels"][0]["source"], "diagnostic_exam");

    // Level 5 skips level 4.
    assert_eq!(
        sc.request_err("activities.enroll", json!({ "studentId": sid, "groupId": g5 })),
        "english_prerequisite"
    );

    let enrolled = sc.request_ok("activities.enroll", json!({ "studentId": sid, "groupId": g3 }));
    assert_eq!(enrolled["activity"]["status"], "approved");
    assert_eq!(enrolled["activity"]["kind"], "enrollment");
    let aid = str_at(&enrolled, "/activity/id");

    let group = sc.request_ok("groups.get", json!({ "groupId": g3 }));
    assert_eq!(group["group"]["enrolledCount"], 1);

    // Grading needs the course to have started.
    assert_eq!(
        sc.request_err("activities.setGrade", json!({ "activityId": aid, "grade": 85 })),
        "invalid_transition"
    );
    sc.request_ok("activities.start", json!({ "activityId": aid }));
    let graded = sc.request_ok("activities.setGrade", json!({ "activityId": aid, "grade": 85 }));
    assert_eq!(graded["activity"]["status"], "completed");

    let status = sc.request_ok("students.englishStatus", json!({ "studentId": sid }));
    assert_eq!(status["english"]["completedLevels"], 3);
    assert_eq!(status["english"]["englishAverage"], 85.0);
    assert_eq!(status["english"]["requirementMet"], false);

    let detail = sc.request_ok("activities.get", json!({ "activityId": aid }));
    assert_eq!(detail["detail"]["groupId"], g3.as_str());
    assert_eq!(detail["detail"]["finalGrade"], 85.0);
    let path: Vec<&str> = detail["history"]
        .as_array()
        .expect("history")
        .iter()
        .filter_map(|h| h["toStatus"].as_str())
        .collect();
    assert_eq!(path, vec!["approved", "in_progress", "completed"]);

    // English grades stay out of the general average.
    let student = sc.request_ok("students.get", json!({ "studentId": sid }));
    assert!(student["student"]["average"].is_null());
}

#[test]
fn english_status_is_cached_until_a_write() {
    let mut sc = spawn_sidecar();
    sc.open_workspace("schoold-english-cache");
    let sid = sc.create_student("C-2");

    let first = sc.request_ok("students.englishStatus", json!({ "studentId": sid }));
    assert_eq!(first["cached"], false);
    let second = sc.request_ok("students.englishStatus", json!({ "studentId": sid }));
    assert_eq!(second["cached"], true);

    sc.request_ok(
        "exams.schedule",
        json!({ "studentId": sid, "examType": "certification", "examDate": "2026-03-01", "cost": 900 }),
    );
    let after = sc.request_ok("students.englishStatus", json!({ "studentId": sid }));
    assert_eq!(after["cached"], false);
    assert!(after["english"]["openExam"].as_str().is_some());

    // Failed writes keep the cache.
    sc.request_err("students.create", json!({ "controlNumber": "" }));
    let kept = sc.request_ok("students.englishStatus", json!({ "studentId": sid }));
    assert_eq!(kept["cached"], true);
}

#[test]
fn passing_certification_meets_the_requirement() {
    let mut sc = spawn_sidecar();
    sc.open_workspace("schoold-certification");
    let sid = sc.create_student("C-3");

    let exam = sc.request_ok(
        "exams.schedule",
        json!({ "studentId": sid, "examType": "certification", "examDate": "2026-03-01" }),
    );
    let id = str_at(&exam, "/exam/activity/id");
    let done = sc.request_ok("exams.recordResult", json!({ "activityId": id, "score": 91 }));
    assert_eq!(done["exam"]["activity"]["status"], "completed");

    let student = sc.request_ok("students.get", json!({ "studentId": sid }));
    assert_eq!(student["student"]["englishCompleted"], true);
    assert_eq!(
        sc.request_err(
            "exams.schedule",
            json!({ "studentId": sid, "examType": "certification", "examDate": "2026-04-01" })
        ),
        "english_requirement_met"
    );

    let summary = sc.request_ok("students.recalculate", json!({ "studentId": sid }));
    assert_eq!(summary["summary"]["english"]["completedLevels"], 6);
    let exams = sc.request_ok("exams.list", json!({ "studentId": sid }));
    assert_eq!(exams["exams"].as_array().map(|a| a.len()), Some(1));
}
