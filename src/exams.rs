use crate::activities::{self, Activity, ActivityKind, ActivityStatus};
use crate::db::sql_text_enum;
use crate::english::{self, ENGLISH_LEVELS};
use crate::error::{Result, SchoolError};
use crate::rules::SchoolRules;
use crate::validators;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamType {
    /// Placement exam; credits every level below the placement.
    Diagnostic,
    /// External certification; passing credits the whole requirement.
    Certification,
}

impl ExamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diagnostic => "diagnostic",
            Self::Certification => "certification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "diagnostic" => Some(Self::Diagnostic),
            "certification" => Some(Self::Certification),
            _ => None,
        }
    }
}

sql_text_enum!(ExamType);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub activity: Activity,
    pub exam_type: ExamType,
    pub exam_date: String,
    pub score: Option<f64>,
    pub result_level: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequest {
    pub student_id: String,
    pub exam_type: ExamType,
    pub exam_date: String,
    #[serde(default)]
    pub cost: f64,
}

pub fn get(conn: &Connection, activity_id: &str) -> Result<Exam> {
    let activity = activities::get(conn, activity_id)?;
    let detail = conn
        .query_row(
            "SELECT exam_type, exam_date, score, result_level FROM exams WHERE activity_id = ?",
            [activity_id],
            |r| {
                Ok((
                    r.get::<_, ExamType>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<f64>>(2)?,
                    r.get::<_, Option<u8>>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((exam_type, exam_date, score, result_level)) = detail else {
        return Err(SchoolError::NotFound("exam"));
    };
    Ok(Exam {
        activity,
        exam_type,
        exam_date,
        score,
        result_level,
    })
}

pub fn list_for_student(conn: &Connection, student_id: &str) -> Result<Vec<Exam>> {
    activities::list_for_student(conn, student_id, Some(ActivityKind::Exam))?
        .iter()
        .map(|a| get(conn, &a.id))
        .collect()
}

pub fn schedule(
    conn: &Connection,
    rules: &SchoolRules,
    today: NaiveDate,
    req: ExamRequest,
) -> Result<Exam> {
    let exam_date = validators::parse_date("examDate", &req.exam_date)?;
    let cost = validators::validate_cost(req.cost)?;

    let tx = conn.unchecked_transaction()?;
    validators::ensure_student_active(&tx, &req.student_id)?;
    english::validate_exam_request(&tx, rules, &req.student_id, req.exam_type)?;
    let activity = activities::insert(&tx, &req.student_id, ActivityKind::Exam, None, cost, today)?;
    tx.execute(
        "INSERT INTO exams(activity_id, exam_type, exam_date, score, result_level)
         VALUES(?, ?, ?, NULL, NULL)",
        (&activity.id, req.exam_type, exam_date.to_string()),
    )?;
    tx.commit()?;

    tracing::info!(
        activity_id = %activity.id,
        code = %activity.code,
        exam_type = req.exam_type.as_str(),
        %exam_date,
        "exam scheduled"
    );
    get(conn, &activity.id)
}

/// Records the outcome of a sat exam. An approved exam is moved through
/// `in_progress` first so the history shows both steps.
pub fn record_result(
    conn: &Connection,
    rules: &SchoolRules,
    activity_id: &str,
    score: f64,
    result_level: Option<i64>,
) -> Result<Exam> {
    let score = validators::validate_grade(score)?;
    let exam = get(conn, activity_id)?;

    let (outcome, level) = match exam.exam_type {
        // Eligibility was fixed at scheduling. A level credited since then
        // keeps its graded credit, which outranks the placement.
        ExamType::Diagnostic => {
            let Some(level) = result_level else {
                return Err(SchoolError::bad_params(
                    "resultLevel is required for diagnostic exams",
                ));
            };
            if !(0..=ENGLISH_LEVELS as i64).contains(&level) {
                return Err(SchoolError::bad_params(format!(
                    "resultLevel must be between 0 and {}",
                    ENGLISH_LEVELS
                )));
            }
            (ActivityStatus::Completed, Some(level as u8))
        }
        ExamType::Certification if rules.passes(score) => (ActivityStatus::Completed, None),
        ExamType::Certification => (ActivityStatus::Failed, None),
    };

    let tx = conn.unchecked_transaction()?;
    let mut activity = exam.activity.clone();
    if activity.status == ActivityStatus::Approved {
        activities::apply_transition(&tx, &activity, ActivityStatus::InProgress, Some("exam taken"))?;
        activity.status = ActivityStatus::InProgress;
    }
    tx.execute(
        "UPDATE exams SET score = ?, result_level = ? WHERE activity_id = ?",
        (score, level, activity_id),
    )?;
    activities::apply_transition(&tx, &activity, outcome, Some(&format!("scored {}", score)))?;
    english::recalculate_student(&tx, &activity.student_id)?;
    tx.commit()?;

    tracing::info!(
        %activity_id,
        exam_type = exam.exam_type.as_str(),
        score,
        ?level,
        outcome = outcome.as_str(),
        "exam result recorded"
    );
    get(conn, activity_id)
}
