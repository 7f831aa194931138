use crate::db;
use crate::error::{Result, SchoolError};
use crate::validators;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub employee_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub employee_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherPatch {
    pub employee_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

const COLUMNS: &str =
    "id, employee_number, first_name, last_name, email, active, created_at, updated_at";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        employee_number: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        email: r.get(4)?,
        active: r.get::<_, i64>(5)? != 0,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

pub fn list(conn: &Connection, active_only: bool) -> Result<Vec<Teacher>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM teachers
         WHERE (? = 0 OR active = 1)
         ORDER BY last_name, first_name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([active_only as i64], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: &str) -> Result<Teacher> {
    let sql = format!("SELECT {COLUMNS} FROM teachers WHERE id = ?");
    conn.query_row(&sql, [id], from_row)
        .optional()?
        .ok_or(SchoolError::NotFound("teacher"))
}

pub fn create(conn: &Connection, new: NewTeacher) -> Result<Teacher> {
    let employee_number = validators::require_text("employeeNumber", &new.employee_number)?;
    let first_name = validators::require_text("firstName", &new.first_name)?;
    let last_name = validators::require_text("lastName", &new.last_name)?;
    let email = validators::require_text("email", &new.email)?.to_lowercase();
    validators::ensure_unique(conn, "teachers", "employee_number", &employee_number, None)?;
    validators::ensure_unique(conn, "teachers", "email", &email, None)?;

    let id = db::new_id();
    let now = db::now_iso();
    conn.execute(
        "INSERT INTO teachers(id, employee_number, first_name, last_name, email, active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &employee_number,
            &first_name,
            &last_name,
            &email,
            new.active.unwrap_or(true) as i64,
            &now,
            &now,
        ),
    )?;
    tracing::info!(teacher_id = %id, %employee_number, "teacher created");
    get(conn, &id)
}

pub fn update(conn: &Connection, id: &str, patch: TeacherPatch) -> Result<Teacher> {
    let mut t = get(conn, id)?;
    if let Some(v) = patch.employee_number.as_deref() {
        let v = validators::require_text("employeeNumber", v)?;
        validators::ensure_unique(conn, "teachers", "employee_number", &v, Some(id))?;
        t.employee_number = v;
    }
    if let Some(v) = patch.first_name.as_deref() {
        t.first_name = validators::require_text("firstName", v)?;
    }
    if let Some(v) = patch.last_name.as_deref() {
        t.last_name = validators::require_text("lastName", v)?;
    }
    if let Some(v) = patch.email.as_deref() {
        let v = validators::require_text("email", v)?.to_lowercase();
        validators::ensure_unique(conn, "teachers", "email", &v, Some(id))?;
        t.email = v;
    }
    if let Some(active) = patch.active {
        t.active = active;
    }
    conn.execute(
        "UPDATE teachers
         SET employee_number = ?, first_name = ?, last_name = ?, email = ?, active = ?, updated_at = ?
         WHERE id = ?",
        (
            &t.employee_number,
            &t.first_name,
            &t.last_name,
            &t.email,
            t.active as i64,
            db::now_iso(),
            id,
        ),
    )?;
    get(conn, id)
}

/// Groups taught by the teacher are kept and left without a teacher.
pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    validators::ensure_teacher_exists(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    let detached = tx.execute(
        "UPDATE class_groups SET teacher_id = NULL, updated_at = ? WHERE teacher_id = ?",
        (db::now_iso(), id),
    )?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [id])?;
    tx.commit()?;
    tracing::info!(teacher_id = %id, detached, "teacher deleted");
    Ok(())
}

#[cfg(test)]
pub(crate) fn new_teacher(number: &str, email: &str) -> NewTeacher {
    NewTeacher {
        employee_number: number.to_string(),
        first_name: "Maria".to_string(),
        last_name: "Gomez".to_string(),
        email: email.to_string(),
        active: None,
    }
}
