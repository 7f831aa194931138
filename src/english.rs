//! English requirement engine.
//!
//! A student satisfies the English requirement once all six levels are
//! credited. Credits come from graded coursework (legacy enrollments, V2 group
//! enrollments, special courses) or from exams (a diagnostic credits the
//! levels below its placement; a passed certification credits every level).
//! The engine also owns the rolling general average stored on the student row.

use crate::activities::{ActivityKind, ActivityStatus};
use crate::error::{Result, SchoolError};
use crate::exams::ExamType;
use crate::rules::SchoolRules;
use crate::students;
use crate::validators;
use rusqlite::Connection;
use serde::Serialize;

pub const ENGLISH_LEVELS: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    LegacyEnrollment,
    Enrollment,
    SpecialCourse,
    DiagnosticExam,
    CertificationExam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelState {
    Completed,
    InProgress,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u8,
    pub state: LevelState,
    pub source: Option<CreditSource>,
    pub grade: Option<f64>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnglishStatus {
    pub student_id: String,
    pub levels: Vec<LevelProgress>,
    pub completed_levels: u8,
    pub next_level: Option<u8>,
    pub requirement_met: bool,
    pub english_average: Option<f64>,
    /// Code (or legacy enrollment id) of the open English course, if any.
    pub open_activity: Option<String>,
    pub open_exam: Option<String>,
    pub diagnostic_taken: bool,
}

impl EnglishStatus {
    pub fn is_completed(&self, level: u8) -> bool {
        self.levels
            .iter()
            .any(|l| l.level == level && l.state == LevelState::Completed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicSummary {
    pub student_id: String,
    pub average: Option<f64>,
    pub english: EnglishStatus,
}

/// One observation about a student's English record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EnglishFact {
    Credit {
        level: u8,
        source: CreditSource,
        grade: Option<f64>,
        reference: String,
    },
    OpenCourse {
        level: u8,
        reference: String,
    },
    OpenExam {
        reference: String,
    },
    DiagnosticTaken,
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn collect_facts(conn: &Connection, student_id: &str) -> Result<Vec<EnglishFact>> {
    let mut facts = Vec::new();

    let mut legacy = conn.prepare(
        "SELECT e.id, s.english_level, e.status, e.final_grade
         FROM enrollments e
         JOIN class_groups g ON g.id = e.group_id
         JOIN subjects s ON s.id = g.subject_id
         WHERE e.student_id = ? AND s.is_english = 1 AND s.english_level IS NOT NULL",
    )?;
    let rows = legacy.query_map([student_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, u8>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<f64>>(3)?,
        ))
    })?;
    for row in rows {
        let (id, level, status, grade) = row?;
        match status.as_str() {
            "passed" => facts.push(EnglishFact::Credit {
                level,
                source: CreditSource::LegacyEnrollment,
                grade,
                reference: id,
            }),
            "enrolled" => facts.push(EnglishFact::OpenCourse {
                level,
                reference: id,
            }),
            _ => {}
        }
    }

    let mut v2 = conn.prepare(
        "SELECT a.code, a.kind, a.status, a.english_level,
                v.final_grade, sc.final_grade, ex.exam_type, ex.result_level
         FROM academic_activities a
         LEFT JOIN enrollments_v2 v ON v.activity_id = a.id
         LEFT JOIN special_courses sc ON sc.activity_id = a.id
         LEFT JOIN exams ex ON ex.activity_id = a.id
         WHERE a.student_id = ?
         ORDER BY a.created_at, a.code",
    )?;
    let rows = v2.query_map([student_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, ActivityKind>(1)?,
            r.get::<_, ActivityStatus>(2)?,
            r.get::<_, Option<u8>>(3)?,
            r.get::<_, Option<f64>>(4)?,
            r.get::<_, Option<f64>>(5)?,
            r.get::<_, Option<ExamType>>(6)?,
            r.get::<_, Option<u8>>(7)?,
        ))
    })?;
    for row in rows {
        let (code, kind, status, level, enr_grade, course_grade, exam_type, result_level) = row?;
        match kind {
            ActivityKind::Enrollment | ActivityKind::SpecialCourse => {
                // Non-English group enrollments carry no level.
                let Some(level) = level else { continue };
                let (source, grade) = if kind == ActivityKind::Enrollment {
                    (CreditSource::Enrollment, enr_grade)
                } else {
                    (CreditSource::SpecialCourse, course_grade)
                };
                if status == ActivityStatus::Completed {
                    facts.push(EnglishFact::Credit {
                        level,
                        source,
                        grade,
                        reference: code,
                    });
                } else if status.is_open() {
                    facts.push(EnglishFact::OpenCourse {
                        level,
                        reference: code,
                    });
                }
            }
            ActivityKind::Exam => {
                if status.is_open() {
                    facts.push(EnglishFact::OpenExam { reference: code });
                    continue;
                }
                if status != ActivityStatus::Completed {
                    continue;
                }
                match exam_type {
                    Some(ExamType::Diagnostic) => {
                        facts.push(EnglishFact::DiagnosticTaken);
                        let placed = result_level.unwrap_or(0).min(ENGLISH_LEVELS);
                        for level in 1..=placed {
                            facts.push(EnglishFact::Credit {
                                level,
                                source: CreditSource::DiagnosticExam,
                                grade: None,
                                reference: code.clone(),
                            });
                        }
                    }
                    Some(ExamType::Certification) => {
                        for level in 1..=ENGLISH_LEVELS {
                            facts.push(EnglishFact::Credit {
                                level,
                                source: CreditSource::CertificationExam,
                                grade: None,
                                reference: code.clone(),
                            });
                        }
                    }
                    None => {}
                }
            }
        }
    }
    Ok(facts)
}

/// Graded credits beat exam credits; among graded ones the higher grade wins.
fn outranks(candidate: Option<f64>, current: Option<f64>) -> bool {
    match (candidate, current) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

pub(crate) fn summarize(student_id: &str, facts: &[EnglishFact]) -> EnglishStatus {
    let mut levels: Vec<LevelProgress> = (1..=ENGLISH_LEVELS)
        .map(|level| LevelProgress {
            level,
            state: LevelState::Pending,
            source: None,
            grade: None,
            reference: None,
        })
        .collect();
    let mut open_activity = None;
    let mut open_exam = None;
    let mut diagnostic_taken = false;

    for fact in facts {
        match fact {
            EnglishFact::Credit {
                level,
                source,
                grade,
                reference,
            } => {
                let Some(slot) = levels.get_mut((*level as usize).wrapping_sub(1)) else {
                    continue;
                };
                if slot.state != LevelState::Completed || outranks(*grade, slot.grade) {
                    slot.state = LevelState::Completed;
                    slot.source = Some(*source);
                    slot.grade = *grade;
                    slot.reference = Some(reference.clone());
                }
            }
            EnglishFact::OpenCourse { level, reference } => {
                if open_activity.is_none() {
                    open_activity = Some(reference.clone());
                }
                if let Some(slot) = levels.get_mut((*level as usize).wrapping_sub(1)) {
                    if slot.state == LevelState::Pending {
                        slot.state = LevelState::InProgress;
                        slot.reference = Some(reference.clone());
                    }
                }
            }
            EnglishFact::OpenExam { reference } => {
                if open_exam.is_none() {
                    open_exam = Some(reference.clone());
                }
            }
            EnglishFact::DiagnosticTaken => diagnostic_taken = true,
        }
    }

    let completed: Vec<&LevelProgress> = levels
        .iter()
        .filter(|l| l.state == LevelState::Completed)
        .collect();
    let graded: Vec<f64> = completed.iter().filter_map(|l| l.grade).collect();
    let english_average = if graded.is_empty() {
        None
    } else {
        Some(round2(graded.iter().sum::<f64>() / graded.len() as f64))
    };
    let completed_levels = completed.len() as u8;
    let next_level = levels
        .iter()
        .find(|l| l.state != LevelState::Completed)
        .map(|l| l.level);

    EnglishStatus {
        student_id: student_id.to_string(),
        levels,
        completed_levels,
        next_level,
        requirement_met: completed_levels == ENGLISH_LEVELS,
        english_average,
        open_activity,
        open_exam,
        diagnostic_taken,
    }
}

pub fn english_status(conn: &Connection, student_id: &str) -> Result<EnglishStatus> {
    validators::ensure_student_exists(conn, student_id)?;
    let facts = collect_facts(conn, student_id)?;
    Ok(summarize(student_id, &facts))
}

/// Credit-weighted mean of `(grade, credits)` pairs, rounded to 2 decimals.
pub(crate) fn weighted_average(results: &[(f64, i64)]) -> Option<f64> {
    let total_credits: i64 = results.iter().map(|(_, c)| *c).sum();
    if total_credits <= 0 {
        return None;
    }
    let weighted: f64 = results.iter().map(|(g, c)| g * (*c as f64)).sum();
    Some(round2(weighted / total_credits as f64))
}

/// Graded non-English results from both enrollment tables.
pub fn general_average(conn: &Connection, student_id: &str) -> Result<Option<f64>> {
    let mut stmt = conn.prepare(
        "SELECT e.final_grade, s.credits
         FROM enrollments e
         JOIN class_groups g ON g.id = e.group_id
         JOIN subjects s ON s.id = g.subject_id
         WHERE e.student_id = ?1 AND e.status IN ('passed', 'failed')
           AND e.final_grade IS NOT NULL AND s.is_english = 0
         UNION ALL
         SELECT v.final_grade, s.credits
         FROM academic_activities a
         JOIN enrollments_v2 v ON v.activity_id = a.id
         JOIN class_groups g ON g.id = v.group_id
         JOIN subjects s ON s.id = g.subject_id
         WHERE a.student_id = ?1 AND a.status IN ('completed', 'failed')
           AND v.final_grade IS NOT NULL AND s.is_english = 0",
    )?;
    let results = stmt
        .query_map([student_id], |r| Ok((r.get::<_, f64>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(weighted_average(&results))
}

/// Recomputes and stores the student's average and requirement flag. Runs
/// inside the caller's transaction after every grade or status change.
pub fn recalculate_student(conn: &Connection, student_id: &str) -> Result<AcademicSummary> {
    let english = english_status(conn, student_id)?;
    let average = general_average(conn, student_id)?;
    students::set_academic_summary(conn, student_id, average, english.requirement_met)?;
    tracing::info!(
        %student_id,
        ?average,
        completed_levels = english.completed_levels,
        requirement_met = english.requirement_met,
        "student recalculated"
    );
    Ok(AcademicSummary {
        student_id: student_id.to_string(),
        average,
        english,
    })
}

pub(crate) fn check_english_enrollment(status: &EnglishStatus, level: u8) -> Result<()> {
    if status.is_completed(level) {
        return Err(SchoolError::rule(
            "english_level_completed",
            format!("English level {} is already completed", level),
        ));
    }
    if level > 1 && !status.is_completed(level - 1) {
        return Err(SchoolError::rule(
            "english_prerequisite",
            format!("English level {} requires level {}", level, level - 1),
        ));
    }
    if let Some(open) = status.open_activity.as_deref() {
        return Err(SchoolError::rule(
            "english_activity_open",
            format!("student already has an open English course ({})", open),
        ));
    }
    Ok(())
}

pub fn validate_english_enrollment(conn: &Connection, student_id: &str, level: u8) -> Result<()> {
    let status = english_status(conn, student_id)?;
    check_english_enrollment(&status, level)
}

pub(crate) fn check_exam_request(
    status: &EnglishStatus,
    rules: &SchoolRules,
    exam_type: ExamType,
) -> Result<()> {
    if let Some(open) = status.open_exam.as_deref() {
        return Err(SchoolError::rule(
            "exam_already_open",
            format!("student already has an open exam ({})", open),
        ));
    }
    if status.requirement_met {
        return Err(SchoolError::rule(
            "english_requirement_met",
            "student already satisfies the English requirement",
        ));
    }
    if exam_type == ExamType::Diagnostic {
        if status.completed_levels > 0 {
            return Err(SchoolError::rule(
                "diagnostic_not_allowed",
                "diagnostic exams are only for students with no credited level",
            ));
        }
        if status.diagnostic_taken && !rules.allow_diagnostic_retake {
            return Err(SchoolError::rule(
                "diagnostic_already_taken",
                "student already took the diagnostic exam",
            ));
        }
    }
    Ok(())
}

pub fn validate_exam_request(
    conn: &Connection,
    rules: &SchoolRules,
    student_id: &str,
    exam_type: ExamType,
) -> Result<()> {
    let status = english_status(conn, student_id)?;
    check_exam_request(&status, rules, exam_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(level: u8, source: CreditSource, grade: Option<f64>, reference: &str) -> EnglishFact {
        EnglishFact::Credit {
            level,
            source,
            grade,
            reference: reference.to_string(),
        }
    }

    #[test]
    fn empty_record_starts_at_level_one() {
        let s = summarize("s1", &[]);
        assert_eq!(s.completed_levels, 0);
        assert_eq!(s.next_level, Some(1));
        assert!(!s.requirement_met);
        assert_eq!(s.english_average, None);
        assert!(s.levels.iter().all(|l| l.state == LevelState::Pending));
    }

    #[test]
    fn graded_credit_beats_exam_credit_and_higher_grade_wins() {
        let facts = vec![
            credit(1, CreditSource::DiagnosticExam, None, "EXM-2026-0001"),
            credit(1, CreditSource::LegacyEnrollment, Some(75.0), "e1"),
            credit(1, CreditSource::SpecialCourse, Some(92.0), "SPC-2026-0001"),
            credit(2, CreditSource::Enrollment, Some(80.0), "ENR-2026-0001"),
            credit(2, CreditSource::DiagnosticExam, None, "EXM-2026-0001"),
        ];
        let s = summarize("s1", &facts);
        assert_eq!(s.levels[0].source, Some(CreditSource::SpecialCourse));
        assert_eq!(s.levels[0].grade, Some(92.0));
        assert_eq!(s.levels[1].source, Some(CreditSource::Enrollment));
        assert_eq!(s.english_average, Some(86.0));
        assert_eq!(s.completed_levels, 2);
        assert_eq!(s.next_level, Some(3));
    }

    #[test]
    fn open_course_marks_level_in_progress() {
        let facts = vec![
            credit(1, CreditSource::Enrollment, Some(70.0), "ENR-2026-0001"),
            EnglishFact::OpenCourse {
                level: 2,
                reference: "SPC-2026-0001".into(),
            },
            EnglishFact::OpenExam {
                reference: "EXM-2026-0002".into(),
            },
        ];
        let s = summarize("s1", &facts);
        assert_eq!(s.levels[1].state, LevelState::InProgress);
        assert_eq!(s.open_activity.as_deref(), Some("SPC-2026-0001"));
        assert_eq!(s.open_exam.as_deref(), Some("EXM-2026-0002"));
    }

    #[test]
    fn all_levels_meet_requirement() {
        let facts: Vec<_> = (1..=ENGLISH_LEVELS)
            .map(|l| credit(l, CreditSource::CertificationExam, None, "EXM-2026-0003"))
            .collect();
        let s = summarize("s1", &facts);
        assert!(s.requirement_met);
        assert_eq!(s.next_level, None);
        assert_eq!(s.english_average, None);
    }

    #[test]
    fn enrollment_checks_follow_level_order() {
        let facts = vec![credit(1, CreditSource::Enrollment, Some(90.0), "ENR-2026-0001")];
        let s = summarize("s1", &facts);
        assert_eq!(check_english_enrollment(&s, 1).unwrap_err().code(), "english_level_completed");
        assert_eq!(check_english_enrollment(&s, 3).unwrap_err().code(), "english_prerequisite");
        check_english_enrollment(&s, 2).unwrap();

        let mut busy = facts.clone();
        busy.push(EnglishFact::OpenCourse {
            level: 2,
            reference: "SPC-2026-0001".into(),
        });
        let s = summarize("s1", &busy);
        assert_eq!(check_english_enrollment(&s, 2).unwrap_err().code(), "english_activity_open");
    }

    #[test]
    fn exam_checks() {
        let rules = SchoolRules::default();
        let fresh = summarize("s1", &[]);
        check_exam_request(&fresh, &rules, ExamType::Diagnostic).unwrap();
        check_exam_request(&fresh, &rules, ExamType::Certification).unwrap();

        let taken = summarize("s1", &[EnglishFact::DiagnosticTaken]);
        assert_eq!(
            check_exam_request(&taken, &rules, ExamType::Diagnostic).unwrap_err().code(),
            "diagnostic_already_taken"
        );
        let lenient = SchoolRules {
            allow_diagnostic_retake: true,
            ..SchoolRules::default()
        };
        check_exam_request(&taken, &lenient, ExamType::Diagnostic).unwrap();

        let placed = summarize("s1", &[credit(1, CreditSource::Enrollment, Some(80.0), "x")]);
        assert_eq!(
            check_exam_request(&placed, &rules, ExamType::Diagnostic).unwrap_err().code(),
            "diagnostic_not_allowed"
        );

        let open = summarize("s1", &[EnglishFact::OpenExam { reference: "EXM".into() }]);
        assert_eq!(
            check_exam_request(&open, &rules, ExamType::Certification).unwrap_err().code(),
            "exam_already_open"
        );
    }

    #[test]
    fn weighted_average_by_credits() {
        assert_eq!(weighted_average(&[]), None);
        assert_eq!(weighted_average(&[(80.0, 5), (90.0, 5)]), Some(85.0));
        assert_eq!(weighted_average(&[(100.0, 8), (70.0, 4)]), Some(90.0));
        assert_eq!(weighted_average(&[(85.0, 3), (90.0, 4), (77.0, 2)]), Some(85.44));
    }
}
