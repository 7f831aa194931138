use crate::db;
use crate::error::{Result, SchoolError};
use crate::validators;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub credits: i64,
    pub is_english: bool,
    pub english_level: Option<u8>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub code: String,
    pub name: String,
    pub credits: i64,
    #[serde(default)]
    pub is_english: bool,
    #[serde(default)]
    pub english_level: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub credits: Option<i64>,
    pub is_english: Option<bool>,
    pub english_level: Option<i64>,
}

const COLUMNS: &str =
    "id, code, name, credits, is_english, english_level, created_at, updated_at";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        credits: r.get(3)?,
        is_english: r.get::<_, i64>(4)? != 0,
        english_level: r.get(5)?,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

fn normalize_code(raw: &str) -> Result<String> {
    Ok(validators::require_text("code", raw)?.to_uppercase())
}

fn validate_credits(credits: i64) -> Result<i64> {
    if credits <= 0 {
        return Err(SchoolError::bad_params("credits must be positive"));
    }
    Ok(credits)
}

/// English subjects carry exactly one level; other subjects carry none.
fn validate_english(is_english: bool, level: Option<i64>) -> Result<Option<u8>> {
    match (is_english, level) {
        (true, Some(l)) => Ok(Some(validators::validate_english_level(l)?)),
        (true, None) => Err(SchoolError::bad_params(
            "englishLevel is required for English subjects",
        )),
        (false, Some(_)) => Err(SchoolError::bad_params(
            "englishLevel is only allowed on English subjects",
        )),
        (false, None) => Ok(None),
    }
}

pub fn list(conn: &Connection, is_english: Option<bool>) -> Result<Vec<Subject>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM subjects
         WHERE (?1 IS NULL OR is_english = ?1)
         ORDER BY is_english, english_level, code"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([is_english.map(|b| b as i64)], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: &str) -> Result<Subject> {
    let sql = format!("SELECT {COLUMNS} FROM subjects WHERE id = ?");
    conn.query_row(&sql, [id], from_row)
        .optional()?
        .ok_or(SchoolError::NotFound("subject"))
}

pub fn create(conn: &Connection, new: NewSubject) -> Result<Subject> {
    let code = normalize_code(&new.code)?;
    let name = validators::require_text("name", &new.name)?;
    let credits = validate_credits(new.credits)?;
    let english_level = validate_english(new.is_english, new.english_level)?;
    validators::ensure_unique(conn, "subjects", "code", &code, None)?;

    let id = db::new_id();
    let now = db::now_iso();
    conn.execute(
        "INSERT INTO subjects(id, code, name, credits, is_english, english_level, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &code,
            &name,
            credits,
            new.is_english as i64,
            english_level,
            &now,
            &now,
        ),
    )?;
    tracing::info!(subject_id = %id, %code, ?english_level, "subject created");
    get(conn, &id)
}

pub fn update(conn: &Connection, id: &str, patch: SubjectPatch) -> Result<Subject> {
    let mut s = get(conn, id)?;
    if let Some(v) = patch.code.as_deref() {
        let code = normalize_code(v)?;
        validators::ensure_unique(conn, "subjects", "code", &code, Some(id))?;
        s.code = code;
    }
    if let Some(v) = patch.name.as_deref() {
        s.name = validators::require_text("name", v)?;
    }
    if let Some(c) = patch.credits {
        s.credits = validate_credits(c)?;
    }
    if patch.is_english.is_some() || patch.english_level.is_some() {
        let is_english = patch.is_english.unwrap_or(s.is_english);
        let level = if is_english {
            patch
                .english_level
                .or(s.english_level.map(i64::from))
        } else {
            patch.english_level
        };
        let english_level = validate_english(is_english, level)?;
        if (is_english, english_level) != (s.is_english, s.english_level) {
            // Grades already recorded against the subject keep their meaning.
            let groups = group_count(conn, id)?;
            if groups > 0 {
                return Err(SchoolError::Conflict(format!(
                    "cannot change the English level of a subject used by {} group(s)",
                    groups
                )));
            }
        }
        s.english_level = english_level;
        s.is_english = is_english;
    }

    conn.execute(
        "UPDATE subjects
         SET code = ?, name = ?, credits = ?, is_english = ?, english_level = ?, updated_at = ?
         WHERE id = ?",
        (
            &s.code,
            &s.name,
            s.credits,
            s.is_english as i64,
            s.english_level,
            db::now_iso(),
            id,
        ),
    )?;
    get(conn, id)
}

fn group_count(conn: &Connection, subject_id: &str) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM class_groups WHERE subject_id = ?",
        [subject_id],
        |r| r.get(0),
    )?;
    Ok(n)
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    validators::ensure_subject_exists(conn, id)?;
    let groups = group_count(conn, id)?;
    if groups > 0 {
        return Err(SchoolError::Conflict(format!(
            "subject is used by {} group(s)",
            groups
        )));
    }
    conn.execute("DELETE FROM subjects WHERE id = ?", [id])?;
    tracing::info!(subject_id = %id, "subject deleted");
    Ok(())
}

#[cfg(test)]
pub(crate) fn new_subject(code: &str, english_level: Option<i64>) -> NewSubject {
    NewSubject {
        code: code.to_string(),
        name: format!("Subject {}", code),
        credits: 5,
        is_english: english_level.is_some(),
        english_level,
    }
}
