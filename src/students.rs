use crate::db::{self, sql_text_enum};
use crate::error::{Result, SchoolError};
use crate::validators;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Graduated => "graduated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "graduated" => Some(Self::Graduated),
            _ => None,
        }
    }
}

sql_text_enum!(StudentStatus);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub control_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub status: StudentStatus,
    pub average: Option<f64>,
    pub english_completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub control_number: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<StudentStatus>,
}

/// Partial update. An empty `email` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub control_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub status: Option<StudentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    pub status: Option<StudentStatus>,
    pub search: Option<String>,
}

const COLUMNS: &str = "id, control_number, first_name, last_name, email, status,
                       average, english_completed, created_at, updated_at";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        control_number: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        email: r.get(4)?,
        status: r.get(5)?,
        average: r.get(6)?,
        english_completed: r.get::<_, i64>(7)? != 0,
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

pub fn list(conn: &Connection, filter: &StudentFilter) -> Result<Vec<Student>> {
    let search = validators::optional_text(filter.search.as_deref())
        .map(|s| format!("%{}%", s.to_lowercase()));
    let sql = format!(
        "SELECT {COLUMNS}
         FROM students
         WHERE (?1 IS NULL OR status = ?1)
           AND (?2 IS NULL
                OR lower(first_name) LIKE ?2
                OR lower(last_name) LIKE ?2
                OR lower(control_number) LIKE ?2)
         ORDER BY last_name, first_name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((filter.status, search), from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: &str) -> Result<Student> {
    let sql = format!("SELECT {COLUMNS} FROM students WHERE id = ?");
    conn.query_row(&sql, [id], from_row)
        .optional()?
        .ok_or(SchoolError::NotFound("student"))
}

pub fn create(conn: &Connection, new: NewStudent) -> Result<Student> {
    let control_number = validators::require_text("controlNumber", &new.control_number)?;
    let first_name = validators::require_text("firstName", &new.first_name)?;
    let last_name = validators::require_text("lastName", &new.last_name)?;
    let email = validators::optional_text(new.email.as_deref());

    validators::ensure_unique(conn, "students", "control_number", &control_number, None)?;
    if let Some(email) = email.as_deref() {
        validators::ensure_unique(conn, "students", "email", email, None)?;
    }

    let id = db::new_id();
    let now = db::now_iso();
    conn.execute(
        "INSERT INTO students(
           id, control_number, first_name, last_name, email, status,
           average, english_completed, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, NULL, 0, ?, ?)",
        (
            &id,
            &control_number,
            &first_name,
            &last_name,
            email.as_deref(),
            new.status.unwrap_or(StudentStatus::Active),
            &now,
            &now,
        ),
    )?;
    tracing::info!(student_id = %id, %control_number, "student created");
    get(conn, &id)
}

pub fn update(conn: &Connection, id: &str, patch: StudentPatch) -> Result<Student> {
    let mut s = get(conn, id)?;
    if let Some(v) = patch.control_number.as_deref() {
        let v = validators::require_text("controlNumber", v)?;
        validators::ensure_unique(conn, "students", "control_number", &v, Some(id))?;
        s.control_number = v;
    }
    if let Some(v) = patch.first_name.as_deref() {
        s.first_name = validators::require_text("firstName", v)?;
    }
    if let Some(v) = patch.last_name.as_deref() {
        s.last_name = validators::require_text("lastName", v)?;
    }
    if let Some(v) = patch.email.as_deref() {
        s.email = validators::optional_text(Some(v));
        if let Some(email) = s.email.as_deref() {
            validators::ensure_unique(conn, "students", "email", email, Some(id))?;
        }
    }
    if let Some(status) = patch.status {
        s.status = status;
    }

    conn.execute(
        "UPDATE students
         SET control_number = ?, first_name = ?, last_name = ?, email = ?, status = ?, updated_at = ?
         WHERE id = ?",
        (
            &s.control_number,
            &s.first_name,
            &s.last_name,
            s.email.as_deref(),
            s.status,
            db::now_iso(),
            id,
        ),
    )?;
    get(conn, id)
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    validators::ensure_student_exists(conn, id)?;

    let tx = conn.unchecked_transaction()?;
    // Dependency order; the schema has no ON DELETE CASCADE.
    tx.execute(
        "DELETE FROM activity_history WHERE activity_id IN
           (SELECT id FROM academic_activities WHERE student_id = ?)",
        [id],
    )?;
    for detail in ["enrollments_v2", "special_courses", "exams"] {
        tx.execute(
            &format!(
                "DELETE FROM {} WHERE activity_id IN
                   (SELECT id FROM academic_activities WHERE student_id = ?)",
                detail
            ),
            [id],
        )?;
    }
    tx.execute("DELETE FROM academic_activities WHERE student_id = ?", [id])?;
    tx.execute("DELETE FROM enrollments WHERE student_id = ?", [id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.commit()?;

    tracing::info!(student_id = %id, "student deleted");
    Ok(())
}

/// Written only by academic recalculation.
pub(crate) fn set_academic_summary(
    conn: &Connection,
    id: &str,
    average: Option<f64>,
    english_completed: bool,
) -> Result<()> {
    let n = conn.execute(
        "UPDATE students SET average = ?, english_completed = ?, updated_at = ? WHERE id = ?",
        (average, english_completed as i64, db::now_iso(), id),
    )?;
    if n == 0 {
        return Err(SchoolError::NotFound("student"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn new_student(control: &str, first: &str, last: &str) -> NewStudent {
    NewStudent {
        control_number: control.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: None,
        status: None,
    }
}
