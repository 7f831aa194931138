use crate::db::{self, sql_text_enum};
use crate::error::{Result, SchoolError};
use crate::rules::SchoolRules;
use crate::validators;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Open,
    Closed,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

sql_text_enum!(GroupStatus);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub subject_id: String,
    pub subject_code: String,
    pub teacher_id: Option<String>,
    pub name: String,
    pub period: String,
    pub capacity: i64,
    pub start_date: String,
    pub end_date: String,
    pub status: GroupStatus,
    pub enrolled_count: i64,
    pub english_level: Option<u8>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub subject_id: String,
    #[serde(default)]
    pub teacher_id: Option<String>,
    pub name: String,
    pub period: String,
    pub capacity: i64,
    pub start_date: String,
    pub end_date: String,
}

/// Partial update. An empty `teacherId` unassigns the teacher.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    pub teacher_id: Option<String>,
    pub name: Option<String>,
    pub period: Option<String>,
    pub capacity: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<GroupStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFilter {
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
    pub period: Option<String>,
}

// Seat count spans the legacy table and live V2 enrollment activities.
const SELECT: &str = "SELECT
       g.id, g.subject_id, s.code, g.teacher_id, g.name, g.period, g.capacity,
       g.start_date, g.end_date, g.status,
       (SELECT COUNT(*) FROM enrollments e
         WHERE e.group_id = g.id AND e.status = 'enrolled')
       + (SELECT COUNT(*) FROM enrollments_v2 v
           JOIN academic_activities a ON a.id = v.activity_id
          WHERE v.group_id = g.id
            AND a.status IN ('pending_payment', 'payment_review', 'approved', 'in_progress')),
       CASE WHEN s.is_english = 1 THEN s.english_level ELSE NULL END,
       g.created_at, g.updated_at
     FROM class_groups g
     JOIN subjects s ON s.id = g.subject_id";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: r.get(0)?,
        subject_id: r.get(1)?,
        subject_code: r.get(2)?,
        teacher_id: r.get(3)?,
        name: r.get(4)?,
        period: r.get(5)?,
        capacity: r.get(6)?,
        start_date: r.get(7)?,
        end_date: r.get(8)?,
        status: r.get(9)?,
        enrolled_count: r.get(10)?,
        english_level: r.get(11)?,
        created_at: r.get(12)?,
        updated_at: r.get(13)?,
    })
}

fn validate_capacity(capacity: i64) -> Result<i64> {
    if capacity <= 0 {
        return Err(SchoolError::bad_params("capacity must be positive"));
    }
    Ok(capacity)
}

fn ensure_unique_name(
    conn: &Connection,
    subject_id: &str,
    name: &str,
    period: &str,
    exclude_id: Option<&str>,
) -> Result<()> {
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM class_groups
             WHERE subject_id = ? AND name = ? AND period = ? AND id <> COALESCE(?, '')",
            (subject_id, name, period, exclude_id),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(SchoolError::Duplicate(format!(
            "group {:?} already exists for this subject in {}",
            name, period
        )));
    }
    Ok(())
}

pub fn list(conn: &Connection, filter: &GroupFilter) -> Result<Vec<Group>> {
    let sql = format!(
        "{SELECT}
         WHERE (?1 IS NULL OR g.subject_id = ?1)
           AND (?2 IS NULL OR g.teacher_id = ?2)
           AND (?3 IS NULL OR g.period = ?3)
         ORDER BY g.period, s.code, g.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (
                filter.subject_id.as_deref(),
                filter.teacher_id.as_deref(),
                filter.period.as_deref(),
            ),
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: &str) -> Result<Group> {
    let sql = format!("{SELECT} WHERE g.id = ?");
    conn.query_row(&sql, [id], from_row)
        .optional()?
        .ok_or(SchoolError::NotFound("group"))
}

pub fn create(conn: &Connection, new: NewGroup) -> Result<Group> {
    validators::ensure_subject_exists(conn, &new.subject_id)?;
    let teacher_id = validators::optional_text(new.teacher_id.as_deref());
    if let Some(t) = teacher_id.as_deref() {
        validators::ensure_teacher_exists(conn, t)?;
    }
    let name = validators::require_text("name", &new.name)?;
    let period = validators::require_text("period", &new.period)?;
    let capacity = validate_capacity(new.capacity)?;
    let start = validators::parse_date("startDate", &new.start_date)?;
    let end = validators::parse_date("endDate", &new.end_date)?;
    validators::ensure_date_range(start, end)?;
    ensure_unique_name(conn, &new.subject_id, &name, &period, None)?;

    let id = db::new_id();
    let now = db::now_iso();
    conn.execute(
        "INSERT INTO class_groups(
           id, subject_id, teacher_id, name, period, capacity,
           start_date, end_date, status, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &new.subject_id,
            teacher_id.as_deref(),
            &name,
            &period,
            capacity,
            start.to_string(),
            end.to_string(),
            GroupStatus::Open,
            &now,
            &now,
        ),
    )?;
    tracing::info!(group_id = %id, subject_id = %new.subject_id, %name, %period, "group created");
    get(conn, &id)
}

pub fn update(conn: &Connection, id: &str, patch: GroupPatch) -> Result<Group> {
    let mut g = get(conn, id)?;
    if let Some(t) = patch.teacher_id.as_deref() {
        g.teacher_id = validators::optional_text(Some(t));
        if let Some(t) = g.teacher_id.as_deref() {
            validators::ensure_teacher_exists(conn, t)?;
        }
    }
    if let Some(v) = patch.name.as_deref() {
        g.name = validators::require_text("name", v)?;
    }
    if let Some(v) = patch.period.as_deref() {
        g.period = validators::require_text("period", v)?;
    }
    if let Some(c) = patch.capacity {
        g.capacity = validate_capacity(c)?;
    }
    if let Some(v) = patch.start_date.as_deref() {
        g.start_date = validators::parse_date("startDate", v)?.to_string();
    }
    if let Some(v) = patch.end_date.as_deref() {
        g.end_date = validators::parse_date("endDate", v)?.to_string();
    }
    if let Some(status) = patch.status {
        g.status = status;
    }
    validators::ensure_date_range(
        validators::parse_date("startDate", &g.start_date)?,
        validators::parse_date("endDate", &g.end_date)?,
    )?;
    ensure_unique_name(conn, &g.subject_id, &g.name, &g.period, Some(id))?;

    conn.execute(
        "UPDATE class_groups
         SET teacher_id = ?, name = ?, period = ?, capacity = ?, start_date = ?, end_date = ?,
             status = ?, updated_at = ?
         WHERE id = ?",
        (
            g.teacher_id.as_deref(),
            &g.name,
            &g.period,
            g.capacity,
            &g.start_date,
            &g.end_date,
            g.status,
            db::now_iso(),
            id,
        ),
    )?;
    get(conn, id)
}

pub fn close(conn: &Connection, id: &str) -> Result<Group> {
    update(
        conn,
        id,
        GroupPatch {
            status: Some(GroupStatus::Closed),
            ..Default::default()
        },
    )
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    validators::ensure_group_exists(conn, id)?;
    let refs: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM enrollments WHERE group_id = ?1)
              + (SELECT COUNT(*) FROM enrollments_v2 WHERE group_id = ?1)",
        [id],
        |r| r.get(0),
    )?;
    if refs > 0 {
        return Err(SchoolError::Conflict(format!(
            "group has {} enrollment record(s)",
            refs
        )));
    }
    conn.execute("DELETE FROM class_groups WHERE id = ?", [id])?;
    tracing::info!(group_id = %id, "group deleted");
    Ok(())
}

/// Open for enrollment on `today` under the current rules.
pub fn ensure_enrollable(group: &Group, rules: &SchoolRules, today: NaiveDate) -> Result<()> {
    if group.status != GroupStatus::Open {
        return Err(SchoolError::rule("group_closed", "group is closed"));
    }
    if rules.enforce_enrollment_window {
        let end = validators::parse_date("endDate", &group.end_date)?;
        if today > end {
            return Err(SchoolError::rule(
                "enrollment_window_closed",
                format!("group ended on {}", end),
            ));
        }
    }
    if rules.enforce_group_capacity && group.enrolled_count >= group.capacity {
        return Err(SchoolError::rule(
            "group_full",
            format!("group is full ({} seats)", group.capacity),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn new_group(subject_id: &str, name: &str, capacity: i64) -> NewGroup {
    NewGroup {
        subject_id: subject_id.to_string(),
        teacher_id: None,
        name: name.to_string(),
        period: "2026-1".to_string(),
        capacity,
        start_date: "2026-01-10".to_string(),
        end_date: "2026-06-30".to_string(),
    }
}
