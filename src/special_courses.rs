use crate::activities::{self, Activity, ActivityKind, ActivityStatus};
use crate::english;
use crate::error::{Result, SchoolError};
use crate::validators;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialCourse {
    pub activity: Activity,
    pub name: String,
    pub english_level: u8,
    pub start_date: String,
    pub end_date: String,
    pub final_grade: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSpecialCourse {
    pub student_id: String,
    pub name: String,
    pub english_level: i64,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub cost: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialCourseFilter {
    pub english_level: Option<i64>,
    pub status: Option<ActivityStatus>,
}

const SELECT: &str = "SELECT
       a.id, a.code, a.student_id, a.kind, a.status, a.english_level, a.cost,
       a.payment_reference, a.rejection_reason, a.created_at, a.updated_at,
       sc.name, sc.english_level, sc.start_date, sc.end_date, sc.final_grade
     FROM special_courses sc
     JOIN academic_activities a ON a.id = sc.activity_id";

fn from_row(r: &Row<'_>) -> rusqlite::Result<SpecialCourse> {
    Ok(SpecialCourse {
        activity: activities::from_row(r)?,
        name: r.get(11)?,
        english_level: r.get(12)?,
        start_date: r.get(13)?,
        end_date: r.get(14)?,
        final_grade: r.get(15)?,
    })
}

pub fn get(conn: &Connection, activity_id: &str) -> Result<SpecialCourse> {
    let sql = format!("{SELECT} WHERE a.id = ?");
    conn.query_row(&sql, [activity_id], from_row)
        .optional()?
        .ok_or(SchoolError::NotFound("special course"))
}

pub fn list(conn: &Connection, filter: &SpecialCourseFilter) -> Result<Vec<SpecialCourse>> {
    let sql = format!(
        "{SELECT}
         WHERE (?1 IS NULL OR sc.english_level = ?1)
           AND (?2 IS NULL OR a.status = ?2)
         ORDER BY sc.start_date, a.code"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((filter.english_level, filter.status), from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Field-level checks that need no database.
fn validate_fields(new: &NewSpecialCourse) -> Result<(String, u8, NaiveDate, NaiveDate, f64)> {
    let name = validators::require_text("name", &new.name)?;
    let level = validators::validate_english_level(new.english_level)?;
    let start = validators::parse_date("startDate", &new.start_date)?;
    let end = validators::parse_date("endDate", &new.end_date)?;
    validators::ensure_date_range(start, end)?;
    let cost = validators::validate_cost(new.cost)?;
    Ok((name, level, start, end, cost))
}

pub fn create(
    conn: &Connection,
    today: NaiveDate,
    new: NewSpecialCourse,
) -> Result<SpecialCourse> {
    let (name, level, start, end, cost) = validate_fields(&new)?;

    let tx = conn.unchecked_transaction()?;
    validators::ensure_student_active(&tx, &new.student_id)?;
    english::validate_english_enrollment(&tx, &new.student_id, level)?;
    let activity = activities::insert(
        &tx,
        &new.student_id,
        ActivityKind::SpecialCourse,
        Some(level),
        cost,
        today,
    )?;
    tx.execute(
        "INSERT INTO special_courses(activity_id, name, english_level, start_date, end_date, final_grade)
         VALUES(?, ?, ?, ?, ?, NULL)",
        (&activity.id, &name, level, start.to_string(), end.to_string()),
    )?;
    tx.commit()?;

    tracing::info!(
        activity_id = %activity.id,
        code = %activity.code,
        english_level = level,
        cost,
        "special course created"
    );
    get(conn, &activity.id)
}
