//! Academic activities: the polymorphic V2 record behind group enrollments,
//! special English courses and exams.
//!
//! Every activity carries a human-readable code (`ENR-2026-0001`), a status
//! driven by the payment/approval workflow below, and an append-only history
//! of status changes.
//!
//! ```text
//! pending_payment -> payment_review -> approved -> in_progress -> completed
//!        |                 |    \          |                \-> failed
//!        |                 |     rejected -+-> payment_review
//!        +-----------------+-------+-------+-> cancelled
//! ```
//! Free activities (cost 0) start at `approved`.

use crate::db::{self, sql_text_enum};
use crate::english;
use crate::enrollments;
use crate::error::{Result, SchoolError};
use crate::rules::SchoolRules;
use crate::validators;
use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Enrollment,
    SpecialCourse,
    Exam,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enrollment => "enrollment",
            Self::SpecialCourse => "special_course",
            Self::Exam => "exam",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enrollment" => Some(Self::Enrollment),
            "special_course" => Some(Self::SpecialCourse),
            "exam" => Some(Self::Exam),
            _ => None,
        }
    }

    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Enrollment => "ENR",
            Self::SpecialCourse => "SPC",
            Self::Exam => "EXM",
        }
    }
}

sql_text_enum!(ActivityKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    PendingPayment,
    PaymentReview,
    Approved,
    InProgress,
    Completed,
    Failed,
    Rejected,
    Cancelled,
}

impl ActivityStatus {
    pub const OPEN: [ActivityStatus; 4] = [
        Self::PendingPayment,
        Self::PaymentReview,
        Self::Approved,
        Self::InProgress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::PaymentReview => "payment_review",
            Self::Approved => "approved",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_payment" => Some(Self::PendingPayment),
            "payment_review" => Some(Self::PaymentReview),
            "approved" => Some(Self::Approved),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Holds a seat or slot: counts toward group capacity and blocks a
    /// second concurrent English activity.
    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }

    pub fn can_transition_to(self, next: ActivityStatus) -> bool {
        use ActivityStatus::*;
        matches!(
            (self, next),
            (PendingPayment, PaymentReview)
                | (PendingPayment, Cancelled)
                | (PaymentReview, Approved)
                | (PaymentReview, Rejected)
                | (PaymentReview, Cancelled)
                | (Rejected, PaymentReview)
                | (Rejected, Cancelled)
                | (Approved, InProgress)
                | (Approved, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }
}

sql_text_enum!(ActivityStatus);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub code: String,
    pub student_id: String,
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    pub english_level: Option<u8>,
    pub cost: f64,
    pub payment_reference: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub from_status: Option<ActivityStatus>,
    pub to_status: ActivityStatus,
    pub note: Option<String>,
    pub changed_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEnrollmentDetail {
    pub group_id: String,
    pub final_grade: Option<f64>,
}

const COLUMNS: &str = "id, code, student_id, kind, status, english_level, cost,
                       payment_reference, rejection_reason, created_at, updated_at";

pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: r.get(0)?,
        code: r.get(1)?,
        student_id: r.get(2)?,
        kind: r.get(3)?,
        status: r.get(4)?,
        english_level: r.get(5)?,
        cost: r.get(6)?,
        payment_reference: r.get(7)?,
        rejection_reason: r.get(8)?,
        created_at: r.get(9)?,
        updated_at: r.get(10)?,
    })
}

pub fn get(conn: &Connection, id: &str) -> Result<Activity> {
    let sql = format!("SELECT {COLUMNS} FROM academic_activities WHERE id = ?");
    conn.query_row(&sql, [id], from_row)
        .optional()?
        .ok_or(SchoolError::NotFound("activity"))
}

pub fn list_for_student(
    conn: &Connection,
    student_id: &str,
    kind: Option<ActivityKind>,
) -> Result<Vec<Activity>> {
    validators::ensure_student_exists(conn, student_id)?;
    let sql = format!(
        "SELECT {COLUMNS} FROM academic_activities
         WHERE student_id = ?1 AND (?2 IS NULL OR kind = ?2)
         ORDER BY created_at, code"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, kind), from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn history(conn: &Connection, id: &str) -> Result<Vec<HistoryEntry>> {
    validators::ensure_activity_exists(conn, id)?;
    let mut stmt = conn.prepare(
        "SELECT id, from_status, to_status, note, changed_at
         FROM activity_history
         WHERE activity_id = ?
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([id], |r| {
            Ok(HistoryEntry {
                id: r.get(0)?,
                from_status: r.get(1)?,
                to_status: r.get(2)?,
                note: r.get(3)?,
                changed_at: r.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn group_enrollment_detail(conn: &Connection, id: &str) -> Result<GroupEnrollmentDetail> {
    conn.query_row(
        "SELECT group_id, final_grade FROM enrollments_v2 WHERE activity_id = ?",
        [id],
        |r| {
            Ok(GroupEnrollmentDetail {
                group_id: r.get(0)?,
                final_grade: r.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or(SchoolError::NotFound("enrollment"))
}

/// `{PREFIX}-{YEAR}-{SEQ}` where SEQ continues from the highest code issued
/// for that prefix and year.
pub fn next_code(conn: &Connection, kind: ActivityKind, year: i32) -> Result<String> {
    let stem = format!("{}-{}-", kind.code_prefix(), year);
    let mut stmt = conn.prepare("SELECT code FROM academic_activities WHERE code LIKE ? || '%'")?;
    let codes = stmt
        .query_map([&stem], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let last = codes
        .iter()
        .filter_map(|c| c.strip_prefix(&stem))
        .filter_map(|seq| seq.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("{}{:04}", stem, last + 1))
}

/// Inserts the activity row and its creation history entry. Callers own the
/// transaction and insert the kind-specific detail row.
pub(crate) fn insert(
    conn: &Connection,
    student_id: &str,
    kind: ActivityKind,
    english_level: Option<u8>,
    cost: f64,
    today: NaiveDate,
) -> Result<Activity> {
    let cost = validators::validate_cost(cost)?;
    let status = if cost > 0.0 {
        ActivityStatus::PendingPayment
    } else {
        ActivityStatus::Approved
    };
    let id = db::new_id();
    let code = next_code(conn, kind, today.year())?;
    let now = db::now_iso();
    conn.execute(
        "INSERT INTO academic_activities(
           id, code, student_id, kind, status, english_level, cost,
           payment_reference, rejection_reason, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)",
        (
            &id,
            &code,
            student_id,
            kind,
            status,
            english_level,
            cost,
            &now,
            &now,
        ),
    )?;
    write_history(conn, &id, None, status, Some("created"))?;
    tracing::info!(activity_id = %id, %code, kind = kind.as_str(), status = status.as_str(), "activity created");
    get(conn, &id)
}

fn write_history(
    conn: &Connection,
    activity_id: &str,
    from: Option<ActivityStatus>,
    to: ActivityStatus,
    note: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO activity_history(activity_id, from_status, to_status, note, changed_at)
         VALUES(?, ?, ?, ?, ?)",
        (activity_id, from, to, note, db::now_iso()),
    )?;
    Ok(())
}

/// Moves the activity to `to` inside the caller's transaction.
pub(crate) fn apply_transition(
    conn: &Connection,
    activity: &Activity,
    to: ActivityStatus,
    note: Option<&str>,
) -> Result<()> {
    if !activity.status.can_transition_to(to) {
        return Err(SchoolError::InvalidTransition {
            from: activity.status.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    conn.execute(
        "UPDATE academic_activities SET status = ?, updated_at = ? WHERE id = ?",
        (to, db::now_iso(), &activity.id),
    )?;
    write_history(conn, &activity.id, Some(activity.status), to, note)?;
    tracing::info!(
        activity_id = %activity.id,
        code = %activity.code,
        from = activity.status.as_str(),
        to = to.as_str(),
        "activity status changed"
    );
    Ok(())
}

fn transition(conn: &Connection, id: &str, to: ActivityStatus, note: Option<&str>) -> Result<Activity> {
    let activity = get(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    apply_transition(&tx, &activity, to, note)?;
    tx.commit()?;
    get(conn, id)
}

pub fn submit_payment(conn: &Connection, id: &str, reference: &str) -> Result<Activity> {
    let reference = validators::require_text("reference", reference)?;
    let activity = get(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    apply_transition(
        &tx,
        &activity,
        ActivityStatus::PaymentReview,
        Some(&format!("payment submitted: {}", reference)),
    )?;
    tx.execute(
        "UPDATE academic_activities SET payment_reference = ?, rejection_reason = NULL WHERE id = ?",
        (&reference, id),
    )?;
    tx.commit()?;
    get(conn, id)
}

pub fn approve_payment(conn: &Connection, id: &str) -> Result<Activity> {
    transition(conn, id, ActivityStatus::Approved, Some("payment approved"))
}

pub fn reject_payment(conn: &Connection, id: &str, reason: &str) -> Result<Activity> {
    let reason = validators::require_text("reason", reason)?;
    let activity = get(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    apply_transition(
        &tx,
        &activity,
        ActivityStatus::Rejected,
        Some(&format!("payment rejected: {}", reason)),
    )?;
    tx.execute(
        "UPDATE academic_activities SET rejection_reason = ? WHERE id = ?",
        (&reason, id),
    )?;
    tx.commit()?;
    get(conn, id)
}

pub fn start(conn: &Connection, id: &str) -> Result<Activity> {
    transition(conn, id, ActivityStatus::InProgress, Some("started"))
}

pub fn cancel(conn: &Connection, id: &str, reason: Option<&str>) -> Result<Activity> {
    let note = match validators::optional_text(reason) {
        Some(r) => format!("cancelled: {}", r),
        None => "cancelled".to_string(),
    };
    let activity = get(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    apply_transition(&tx, &activity, ActivityStatus::Cancelled, Some(&note))?;
    english::recalculate_student(&tx, &activity.student_id)?;
    tx.commit()?;
    get(conn, id)
}

/// V2 group enrollment. Same checks as the legacy path; free, so it starts
/// approved.
pub fn enroll_in_group(
    conn: &Connection,
    rules: &SchoolRules,
    today: NaiveDate,
    student_id: &str,
    group_id: &str,
) -> Result<Activity> {
    let tx = conn.unchecked_transaction()?;
    let group = enrollments::validate_group_enrollment(&tx, rules, today, student_id, group_id)?;
    let activity = insert(
        &tx,
        student_id,
        ActivityKind::Enrollment,
        group.english_level,
        0.0,
        today,
    )?;
    tx.execute(
        "INSERT INTO enrollments_v2(activity_id, group_id, final_grade) VALUES(?, ?, NULL)",
        (&activity.id, group_id),
    )?;
    tx.commit()?;
    Ok(activity)
}

/// Final grade for a group enrollment or special course. Exams record
/// results through `exams::record_result`.
pub fn set_grade(conn: &Connection, rules: &SchoolRules, id: &str, grade: f64) -> Result<Activity> {
    let grade = validators::validate_grade(grade)?;
    let activity = get(conn, id)?;
    let detail_table = match activity.kind {
        ActivityKind::Enrollment => "enrollments_v2",
        ActivityKind::SpecialCourse => "special_courses",
        ActivityKind::Exam => {
            return Err(SchoolError::rule(
                "unsupported_activity",
                "exam results are recorded with exams.recordResult",
            ))
        }
    };
    if activity.status != ActivityStatus::InProgress {
        return Err(SchoolError::InvalidTransition {
            from: activity.status.as_str().to_string(),
            to: ActivityStatus::Completed.as_str().to_string(),
        });
    }
    let outcome = if rules.passes(grade) {
        ActivityStatus::Completed
    } else {
        ActivityStatus::Failed
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        &format!("UPDATE {} SET final_grade = ? WHERE activity_id = ?", detail_table),
        (grade, id),
    )?;
    apply_transition(&tx, &activity, outcome, Some(&format!("graded {}", grade)))?;
    english::recalculate_student(&tx, &activity.student_id)?;
    tx.commit()?;
    get(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{groups, students, subjects};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
    }

    fn student(conn: &Connection) -> String {
        students::create(conn, students::new_student("C-1", "Ana", "Lopez"))
            .unwrap()
            .id
    }

    #[test]
    fn transition_table() {
        use ActivityStatus::*;
        assert!(PendingPayment.can_transition_to(PaymentReview));
        assert!(Rejected.can_transition_to(PaymentReview));
        assert!(InProgress.can_transition_to(Failed));
        assert!(!PendingPayment.can_transition_to(Approved));
        assert!(!InProgress.can_transition_to(Cancelled));
        for terminal in [Completed, Failed, Cancelled] {
            for next in [PendingPayment, PaymentReview, Approved, InProgress, Completed, Failed, Rejected, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(Approved.is_open());
        assert!(!Rejected.is_open());
    }

    #[test]
    fn codes_continue_per_prefix_and_year() {
        let conn = db::test_conn();
        let sid = student(&conn);
        let a = insert(&conn, &sid, ActivityKind::Exam, None, 0.0, today()).unwrap();
        let b = insert(&conn, &sid, ActivityKind::Exam, None, 0.0, today()).unwrap();
        let c = insert(&conn, &sid, ActivityKind::SpecialCourse, Some(1), 0.0, today()).unwrap();
        let next_year = NaiveDate::from_ymd_opt(2027, 1, 5).unwrap();
        let d = insert(&conn, &sid, ActivityKind::Exam, None, 0.0, next_year).unwrap();
        assert_eq!(a.code, "EXM-2026-0001");
        assert_eq!(b.code, "EXM-2026-0002");
        assert_eq!(c.code, "SPC-2026-0001");
        assert_eq!(d.code, "EXM-2027-0001");
    }

    #[test]
    fn payment_workflow_writes_history() {
        let conn = db::test_conn();
        let sid = student(&conn);
        let a = insert(&conn, &sid, ActivityKind::SpecialCourse, Some(1), 1500.0, today()).unwrap();
        assert_eq!(a.status, ActivityStatus::PendingPayment);

        let e = approve_payment(&conn, &a.id).unwrap_err();
        assert_eq!(e.code(), "invalid_transition");

        let a = submit_payment(&conn, &a.id, "REF-1").unwrap();
        assert_eq!(a.status, ActivityStatus::PaymentReview);
        assert_eq!(a.payment_reference.as_deref(), Some("REF-1"));

        assert_eq!(reject_payment(&conn, &a.id, " ").unwrap_err().code(), "bad_params");
        let a = reject_payment(&conn, &a.id, "blurry receipt").unwrap();
        assert_eq!(a.status, ActivityStatus::Rejected);
        assert_eq!(a.rejection_reason.as_deref(), Some("blurry receipt"));

        let a = submit_payment(&conn, &a.id, "REF-2").unwrap();
        assert_eq!(a.rejection_reason, None);
        let a = approve_payment(&conn, &a.id).unwrap();
        let a = start(&conn, &a.id).unwrap();
        assert_eq!(a.status, ActivityStatus::InProgress);
        assert_eq!(cancel(&conn, &a.id, None).unwrap_err().code(), "invalid_transition");

        let h = history(&conn, &a.id).unwrap();
        let path: Vec<_> = h.iter().map(|e| e.to_status.as_str()).collect();
        assert_eq!(
            path,
            vec![
                "pending_payment",
                "payment_review",
                "rejected",
                "payment_review",
                "approved",
                "in_progress"
            ]
        );
        assert_eq!(h[0].from_status, None);
        assert_eq!(h[2].note.as_deref(), Some("payment rejected: blurry receipt"));
    }

    #[test]
    fn group_enrollment_grading() {
        let conn = db::test_conn();
        let rules = SchoolRules::default();
        let sid = student(&conn);
        let sub = subjects::create(&conn, subjects::new_subject("MAT1", None)).unwrap();
        let g = groups::create(&conn, groups::new_group(&sub.id, "A", 1)).unwrap();

        let a = enroll_in_group(&conn, &rules, today(), &sid, &g.id).unwrap();
        assert_eq!(a.status, ActivityStatus::Approved);
        assert_eq!(a.code, "ENR-2026-0001");
        assert_eq!(groups::get(&conn, &g.id).unwrap().enrolled_count, 1);

        let e = set_grade(&conn, &rules, &a.id, 90.0).unwrap_err();
        assert_eq!(e.code(), "invalid_transition");

        start(&conn, &a.id).unwrap();
        let done = set_grade(&conn, &rules, &a.id, 65.0).unwrap();
        assert_eq!(done.status, ActivityStatus::Failed);
        assert_eq!(group_enrollment_detail(&conn, &a.id).unwrap().final_grade, Some(65.0));
        assert_eq!(students::get(&conn, &sid).unwrap().average, Some(65.0));
        assert_eq!(groups::get(&conn, &g.id).unwrap().enrolled_count, 0);
    }

    #[test]
    fn exams_cannot_be_graded_here() {
        let conn = db::test_conn();
        let sid = student(&conn);
        let a = insert(&conn, &sid, ActivityKind::Exam, None, 0.0, today()).unwrap();
        let e = set_grade(&conn, &SchoolRules::default(), &a.id, 80.0).unwrap_err();
        assert_eq!(e.code(), "unsupported_activity");
    }
}
