use crate::db;
use crate::error::{Result, SchoolError};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};

const RULES_KEY: &str = "school.rules";

/// Runtime school policy, persisted per workspace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolRules {
    pub passing_grade: f64,
    pub enforce_group_capacity: bool,
    pub enforce_enrollment_window: bool,
    pub allow_diagnostic_retake: bool,
}

impl Default for SchoolRules {
    fn default() -> Self {
        Self {
            passing_grade: 70.0,
            enforce_group_capacity: true,
            enforce_enrollment_window: true,
            allow_diagnostic_retake: false,
        }
    }
}

impl SchoolRules {
    pub fn passes(&self, grade: f64) -> bool {
        grade >= self.passing_grade
    }

    fn apply_field(&mut self, key: &str, v: &Value) -> std::result::Result<(), String> {
        match key {
            "passingGrade" => {
                let g = v
                    .as_f64()
                    .ok_or_else(|| "passingGrade must be a number".to_string())?;
                if !(0.0..=100.0).contains(&g) {
                    return Err("passingGrade must be between 0 and 100".into());
                }
                self.passing_grade = g;
            }
            "enforceGroupCapacity" => self.enforce_group_capacity = parse_bool(v, key)?,
            "enforceEnrollmentWindow" => self.enforce_enrollment_window = parse_bool(v, key)?,
            "allowDiagnosticRetake" => self.allow_diagnostic_retake = parse_bool(v, key)?,
            _ => return Err(format!("unknown rules field: {}", key)),
        }
        Ok(())
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn parse_bool(v: &Value, key: &str) -> std::result::Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

pub fn load(conn: &Connection) -> Result<SchoolRules> {
    let mut rules = SchoolRules::default();
    if let Some(saved) = db::settings_get_json(conn, RULES_KEY)? {
        if let Some(obj) = saved.as_object() {
            // Apply field by field so one bad historical value does not reset the rest.
            for (k, v) in obj {
                if let Err(msg) = rules.apply_field(k, v) {
                    tracing::warn!(field = %k, %msg, "ignoring saved rules field");
                }
            }
        }
    }
    Ok(rules)
}

pub fn update(conn: &Connection, patch: &Map<String, Value>) -> Result<SchoolRules> {
    let mut rules = load(conn)?;
    for (k, v) in patch {
        rules.apply_field(k, v).map_err(SchoolError::BadParams)?;
    }
    db::settings_set_json(conn, RULES_KEY, &rules.to_json())?;
    tracing::info!(?rules, "school rules updated");
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_when_nothing_saved() {
        let conn = db::test_conn();
        assert_eq!(load(&conn).unwrap(), SchoolRules::default());
    }

    #[test]
    fn update_merges_and_persists() {
        let conn = db::test_conn();
        let patch = json!({ "passingGrade": 60, "allowDiagnosticRetake": true });
        let r = update(&conn, patch.as_object().unwrap()).unwrap();
        assert_eq!(r.passing_grade, 60.0);
        assert!(r.allow_diagnostic_retake);
        assert!(r.enforce_group_capacity);
        assert_eq!(load(&conn).unwrap(), r);
    }

    #[test]
    fn update_rejects_unknown_and_out_of_range() {
        let conn = db::test_conn();
        let e = update(&conn, json!({ "nope": 1 }).as_object().unwrap()).unwrap_err();
        assert_eq!(e.code(), "bad_params");
        let e = update(&conn, json!({ "passingGrade": 101 }).as_object().unwrap()).unwrap_err();
        assert_eq!(e.code(), "bad_params");
        assert_eq!(load(&conn).unwrap(), SchoolRules::default());
    }

    #[test]
    fn malformed_saved_fields_are_skipped() {
        let conn = db::test_conn();
        db::settings_set_json(
            &conn,
            RULES_KEY,
            &json!({ "passingGrade": "high", "enforceGroupCapacity": false }),
        )
        .unwrap();
        let r = load(&conn).unwrap();
        assert_eq!(r.passing_grade, 70.0);
        assert!(!r.enforce_group_capacity);
    }
}
