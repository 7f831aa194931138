//! Existence, uniqueness and value checks shared by the entity and
//! enrollment modules.

use crate::error::{Result, SchoolError};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 100.0;

pub fn require_text(field: &str, value: &str) -> Result<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(SchoolError::bad_params(format!("{} must not be empty", field)));
    }
    Ok(t.to_string())
}

/// Blank optional strings collapse to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .and_then(|s| if s.is_empty() { None } else { Some(s) })
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| SchoolError::bad_params(format!("{} must be YYYY-MM-DD", field)))
}

pub fn ensure_date_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(SchoolError::bad_params("startDate must not be after endDate"));
    }
    Ok(())
}

pub fn validate_grade(grade: f64) -> Result<f64> {
    if !grade.is_finite() || !(MIN_GRADE..=MAX_GRADE).contains(&grade) {
        return Err(SchoolError::bad_params(format!(
            "grade must be between {} and {}",
            MIN_GRADE, MAX_GRADE
        )));
    }
    Ok(grade)
}

pub fn validate_english_level(level: i64) -> Result<u8> {
    if !(1..=crate::english::ENGLISH_LEVELS as i64).contains(&level) {
        return Err(SchoolError::bad_params(format!(
            "englishLevel must be between 1 and {}",
            crate::english::ENGLISH_LEVELS
        )));
    }
    Ok(level as u8)
}

pub fn validate_cost(cost: f64) -> Result<f64> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(SchoolError::bad_params("cost must be a non-negative number"));
    }
    Ok(cost)
}

fn exists(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

fn ensure_exists(conn: &Connection, table: &str, id: &str, entity: &'static str) -> Result<()> {
    if exists(conn, table, id)? {
        Ok(())
    } else {
        Err(SchoolError::NotFound(entity))
    }
}

pub fn ensure_student_exists(conn: &Connection, id: &str) -> Result<()> {
    ensure_exists(conn, "students", id, "student")
}

pub fn ensure_teacher_exists(conn: &Connection, id: &str) -> Result<()> {
    ensure_exists(conn, "teachers", id, "teacher")
}

pub fn ensure_subject_exists(conn: &Connection, id: &str) -> Result<()> {
    ensure_exists(conn, "subjects", id, "subject")
}

pub fn ensure_group_exists(conn: &Connection, id: &str) -> Result<()> {
    ensure_exists(conn, "class_groups", id, "group")
}

pub fn ensure_activity_exists(conn: &Connection, id: &str) -> Result<()> {
    ensure_exists(conn, "academic_activities", id, "activity")
}

/// Fails with `duplicate` when another row already holds `value` in `column`.
/// `exclude_id` skips the row being updated.
pub fn ensure_unique(
    conn: &Connection,
    table: &str,
    column: &str,
    value: &str,
    exclude_id: Option<&str>,
) -> Result<()> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ? AND id <> COALESCE(?, '')",
        table, column
    );
    let taken: Option<i64> = conn
        .query_row(&sql, (value, exclude_id), |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(SchoolError::Duplicate(format!(
            "{} {:?} is already in use",
            column, value
        )));
    }
    Ok(())
}

pub fn ensure_student_active(conn: &Connection, student_id: &str) -> Result<()> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    match status.as_deref() {
        None => Err(SchoolError::NotFound("student")),
        Some("active") => Ok(()),
        Some(other) => Err(SchoolError::rule(
            "student_inactive",
            format!("student is {}", other),
        )),
    }
}

/// A student may hold one live seat per group across the legacy and V2 tables.
pub fn ensure_not_enrolled(conn: &Connection, student_id: &str, group_id: &str) -> Result<()> {
    let legacy: i64 = conn.query_row(
        "SELECT COUNT(*) FROM enrollments
         WHERE student_id = ? AND group_id = ? AND status <> 'dropped'",
        (student_id, group_id),
        |r| r.get(0),
    )?;
    let v2: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM academic_activities a
         JOIN enrollments_v2 e ON e.activity_id = a.id
         WHERE a.student_id = ? AND e.group_id = ?
           AND a.status IN ('pending_payment', 'payment_review', 'approved', 'in_progress', 'completed')",
        (student_id, group_id),
        |r| r.get(0),
    )?;
    if legacy + v2 > 0 {
        return Err(SchoolError::rule(
            "already_enrolled",
            "student is already enrolled in this group",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn insert_student(conn: &Connection, id: &str, control: &str, status: &str) {
        conn.execute(
            "INSERT INTO students(id, control_number, first_name, last_name, status, created_at, updated_at)
             VALUES(?, ?, 'Ana', 'Lopez', ?, 'x', 'x')",
            (id, control, status),
        )
        .unwrap();
    }

    #[test]
    fn text_and_dates() {
        assert_eq!(require_text("name", "  Ana ").unwrap(), "Ana");
        assert_eq!(require_text("name", "   ").unwrap_err().code(), "bad_params");
        assert_eq!(optional_text(Some("  ")), None);
        assert_eq!(optional_text(Some(" a@b.c ")), Some("a@b.c".to_string()));

        let s = parse_date("startDate", "2026-01-10").unwrap();
        let e = parse_date("endDate", "2026-06-30").unwrap();
        assert!(ensure_date_range(s, e).is_ok());
        assert!(ensure_date_range(e, s).is_err());
        assert!(parse_date("startDate", "10/01/2026").is_err());
    }

    #[test]
    fn grades_levels_and_costs() {
        assert!(validate_grade(0.0).is_ok());
        assert!(validate_grade(100.0).is_ok());
        assert!(validate_grade(100.5).is_err());
        assert!(validate_grade(f64::NAN).is_err());
        assert_eq!(validate_english_level(6).unwrap(), 6);
        assert!(validate_english_level(0).is_err());
        assert!(validate_english_level(7).is_err());
        assert!(validate_cost(0.0).is_ok());
        assert!(validate_cost(-1.0).is_err());
    }

    #[test]
    fn uniqueness_excludes_self() {
        let conn = db::test_conn();
        insert_student(&conn, "s1", "C-1", "active");
        let e = ensure_unique(&conn, "students", "control_number", "C-1", None).unwrap_err();
        assert_eq!(e.code(), "duplicate");
        ensure_unique(&conn, "students", "control_number", "C-1", Some("s1")).unwrap();
        ensure_unique(&conn, "students", "control_number", "C-2", None).unwrap();
    }

    #[test]
    fn student_activity_checks() {
        let conn = db::test_conn();
        insert_student(&conn, "s1", "C-1", "active");
        insert_student(&conn, "s2", "C-2", "graduated");
        ensure_student_active(&conn, "s1").unwrap();
        assert_eq!(
            ensure_student_active(&conn, "s2").unwrap_err().code(),
            "student_inactive"
        );
        assert_eq!(
            ensure_student_active(&conn, "nope").unwrap_err().code(),
            "not_found"
        );
        assert_eq!(
            ensure_group_exists(&conn, "g").unwrap_err().code(),
            "not_found"
        );
    }
}
