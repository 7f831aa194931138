//! Legacy `enrollments` table: one row per student per group, graded once the
//! course ends. New group enrollments can also be made through activities.

use crate::db::{self, sql_text_enum};
use crate::english;
use crate::error::{Result, SchoolError};
use crate::groups::{self, Group};
use crate::rules::SchoolRules;
use crate::validators;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    Passed,
    Failed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enrolled => "enrolled",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enrolled" => Some(Self::Enrolled),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }
}

sql_text_enum!(EnrollmentStatus);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub group_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub english_level: Option<u8>,
    pub status: EnrollmentStatus,
    pub final_grade: Option<f64>,
    pub enrolled_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentFilter {
    pub student_id: Option<String>,
    pub group_id: Option<String>,
}

const SELECT: &str = "SELECT
       e.id, e.student_id, e.group_id, s.id, s.name,
       CASE WHEN s.is_english = 1 THEN s.english_level ELSE NULL END,
       e.status, e.final_grade, e.enrolled_at, e.updated_at
     FROM enrollments e
     JOIN class_groups g ON g.id = e.group_id
     JOIN subjects s ON s.id = g.subject_id";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: r.get(0)?,
        student_id: r.get(1)?,
        group_id: r.get(2)?,
        subject_id: r.get(3)?,
        subject_name: r.get(4)?,
        english_level: r.get(5)?,
        status: r.get(6)?,
        final_grade: r.get(7)?,
        enrolled_at: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

pub fn list(conn: &Connection, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
    if filter.student_id.is_none() && filter.group_id.is_none() {
        return Err(SchoolError::bad_params("studentId or groupId is required"));
    }
    let sql = format!(
        "{SELECT}
         WHERE (?1 IS NULL OR e.student_id = ?1)
           AND (?2 IS NULL OR e.group_id = ?2)
         ORDER BY e.enrolled_at, e.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (filter.student_id.as_deref(), filter.group_id.as_deref()),
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: &str) -> Result<Enrollment> {
    let sql = format!("{SELECT} WHERE e.id = ?");
    conn.query_row(&sql, [id], from_row)
        .optional()?
        .ok_or(SchoolError::NotFound("enrollment"))
}

/// Checks shared by legacy and V2 group enrollment. Returns the group so
/// callers can read its English level.
pub(crate) fn validate_group_enrollment(
    conn: &Connection,
    rules: &SchoolRules,
    today: NaiveDate,
    student_id: &str,
    group_id: &str,
) -> Result<Group> {
    validators::ensure_student_active(conn, student_id)?;
    let group = groups::get(conn, group_id)?;
    groups::ensure_enrollable(&group, rules, today)?;
    validators::ensure_not_enrolled(conn, student_id, group_id)?;
    if let Some(level) = group.english_level {
        english::validate_english_enrollment(conn, student_id, level)?;
    }
    Ok(group)
}

pub fn create(
    conn: &Connection,
    rules: &SchoolRules,
    today: NaiveDate,
    student_id: &str,
    group_id: &str,
) -> Result<Enrollment> {
    let tx = conn.unchecked_transaction()?;
    validate_group_enrollment(&tx, rules, today, student_id, group_id)?;

    let id = db::new_id();
    let now = db::now_iso();
    tx.execute(
        "INSERT INTO enrollments(id, student_id, group_id, status, final_grade, enrolled_at, updated_at)
         VALUES(?, ?, ?, ?, NULL, ?, ?)",
        (&id, student_id, group_id, EnrollmentStatus::Enrolled, &now, &now),
    )?;
    tx.commit()?;

    tracing::info!(enrollment_id = %id, %student_id, %group_id, "enrollment created");
    get(conn, &id)
}

/// Grading decides passed/failed against the passing grade. Re-grading a
/// graded row is allowed; dropped rows cannot be graded.
pub fn set_grade(
    conn: &Connection,
    rules: &SchoolRules,
    id: &str,
    grade: f64,
) -> Result<Enrollment> {
    let grade = validators::validate_grade(grade)?;
    let current = get(conn, id)?;
    if current.status == EnrollmentStatus::Dropped {
        return Err(SchoolError::rule(
            "enrollment_dropped",
            "cannot grade a dropped enrollment",
        ));
    }
    let status = if rules.passes(grade) {
        EnrollmentStatus::Passed
    } else {
        EnrollmentStatus::Failed
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE enrollments SET final_grade = ?, status = ?, updated_at = ? WHERE id = ?",
        (grade, status, db::now_iso(), id),
    )?;
    english::recalculate_student(&tx, &current.student_id)?;
    tx.commit()?;

    tracing::info!(enrollment_id = %id, grade, status = status.as_str(), "enrollment graded");
    get(conn, id)
}

pub fn drop(conn: &Connection, id: &str) -> Result<Enrollment> {
    let current = get(conn, id)?;
    if current.status != EnrollmentStatus::Enrolled {
        return Err(SchoolError::rule(
            "enrollment_not_active",
            format!("cannot drop a {} enrollment", current.status.as_str()),
        ));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE enrollments SET status = ?, updated_at = ? WHERE id = ?",
        (EnrollmentStatus::Dropped, db::now_iso(), id),
    )?;
    english::recalculate_student(&tx, &current.student_id)?;
    tx.commit()?;

    tracing::info!(enrollment_id = %id, "enrollment dropped");
    get(conn, id)
}
