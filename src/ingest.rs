use std::io;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{GraduationEvaluation, GraduationStatus, TeacherEvaluation};

pub const DEFAULT_REQUIRED_CREDITS: i32 = 120;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IngestError {
    #[error("student id is required")]
    MissingStudentId,
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} cannot be negative (got {value})")]
    NegativeCredits { field: &'static str, value: i32 },
    #[error("unknown graduation status '{0}'")]
    UnknownStatus(String),
}

/// Raw teacher evaluation as it arrives from a CSV file or the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeacherEvaluationRow {
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub class_code: String,
    pub score: Option<f64>,
    pub attitude: Option<f64>,
    pub participation: Option<f64>,
    #[serde(default)]
    pub feedback: String,
    pub evaluation_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraduationEvaluationRow {
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    pub gpa: Option<f64>,
    pub total_credits: Option<i32>,
    pub required_credits: Option<i32>,
    pub thesis_score: Option<f64>,
    pub final_exam_score: Option<f64>,
    pub status: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

impl TeacherEvaluationRow {
    pub fn into_record(self, id: Uuid) -> Result<TeacherEvaluation, IngestError> {
        let student_id = required_id(&self.student_id)?;

        Ok(TeacherEvaluation {
            id,
            student_id,
            student_name: self.student_name.trim().to_string(),
            teacher_name: self.teacher_name.trim().to_string(),
            class_code: self.class_code.trim().to_string(),
            score: bounded("score", self.score, 0.0, 100.0)?,
            attitude: bounded("attitude", self.attitude, 0.0, 100.0)?,
            participation: bounded("participation", self.participation, 0.0, 100.0)?,
            feedback: self.feedback,
            evaluation_date: self
                .evaluation_date
                .unwrap_or_else(|| Utc::now().date_naive()),
        })
    }
}

impl GraduationEvaluationRow {
    pub fn into_record(self, id: Uuid) -> Result<GraduationEvaluation, IngestError> {
        let student_id = required_id(&self.student_id)?;
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => GraduationStatus::default(),
            Some(token) => token
                .parse()
                .map_err(|_| IngestError::UnknownStatus(token.to_string()))?,
        };

        Ok(GraduationEvaluation {
            id,
            student_id,
            student_name: self.student_name.trim().to_string(),
            gpa: bounded("gpa", self.gpa, 0.0, 4.0)?,
            total_credits: credits("total_credits", self.total_credits.unwrap_or(0))?,
            required_credits: credits(
                "required_credits",
                self.required_credits.unwrap_or(DEFAULT_REQUIRED_CREDITS),
            )?,
            thesis_score: bounded("thesis_score", self.thesis_score, 0.0, 100.0)?,
            final_exam_score: bounded("final_exam_score", self.final_exam_score, 0.0, 100.0)?,
            status,
            evaluation_date: self
                .evaluation_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            notes: self.notes,
        })
    }
}

/// Changes to a stored teacher evaluation. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TeacherEvaluationPatch {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub teacher_name: Option<String>,
    pub class_code: Option<String>,
    pub score: Option<f64>,
    pub attitude: Option<f64>,
    pub participation: Option<f64>,
    pub feedback: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
}

impl TeacherEvaluationPatch {
    pub fn apply(self, current: &TeacherEvaluation) -> Result<TeacherEvaluation, IngestError> {
        TeacherEvaluationRow {
            student_id: self.student_id.unwrap_or_else(|| current.student_id.clone()),
            student_name: self.student_name.unwrap_or_else(|| current.student_name.clone()),
            teacher_name: self.teacher_name.unwrap_or_else(|| current.teacher_name.clone()),
            class_code: self.class_code.unwrap_or_else(|| current.class_code.clone()),
            score: Some(self.score.unwrap_or(current.score)),
            attitude: Some(self.attitude.unwrap_or(current.attitude)),
            participation: Some(self.participation.unwrap_or(current.participation)),
            feedback: self.feedback.unwrap_or_else(|| current.feedback.clone()),
            evaluation_date: Some(self.evaluation_date.unwrap_or(current.evaluation_date)),
        }
        .into_record(current.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraduationEvaluationPatch {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub gpa: Option<f64>,
    pub total_credits: Option<i32>,
    pub required_credits: Option<i32>,
    pub thesis_score: Option<f64>,
    pub final_exam_score: Option<f64>,
    pub status: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl GraduationEvaluationPatch {
    pub fn apply(self, current: &GraduationEvaluation) -> Result<GraduationEvaluation, IngestError> {
        GraduationEvaluationRow {
            student_id: self.student_id.unwrap_or_else(|| current.student_id.clone()),
            student_name: self.student_name.unwrap_or_else(|| current.student_name.clone()),
            gpa: Some(self.gpa.unwrap_or(current.gpa)),
            total_credits: Some(self.total_credits.unwrap_or(current.total_credits)),
            required_credits: Some(self.required_credits.unwrap_or(current.required_credits)),
            thesis_score: Some(self.thesis_score.unwrap_or(current.thesis_score)),
            final_exam_score: Some(self.final_exam_score.unwrap_or(current.final_exam_score)),
            status: Some(
                self.status
                    .unwrap_or_else(|| current.status.as_str().to_string()),
            ),
            evaluation_date: Some(self.evaluation_date.unwrap_or(current.evaluation_date)),
            notes: self.notes.unwrap_or_else(|| current.notes.clone()),
        }
        .into_record(current.id)
    }
}

/// Parses and validates a whole teacher evaluation file. Any bad row fails the
/// file, so callers never see a partial result.
pub fn read_teacher_csv<R: io::Read>(source: R) -> anyhow::Result<Vec<TeacherEvaluation>> {
    let mut reader = csv::Reader::from_reader(source);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<TeacherEvaluationRow>().enumerate() {
        let line = index + 2;
        let record = result
            .with_context(|| format!("line {line}: malformed row"))?
            .into_record(Uuid::new_v4())
            .with_context(|| format!("line {line}: invalid teacher evaluation"))?;
        records.push(record);
    }

    Ok(records)
}

pub fn read_graduation_csv<R: io::Read>(source: R) -> anyhow::Result<Vec<GraduationEvaluation>> {
    let mut reader = csv::Reader::from_reader(source);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<GraduationEvaluationRow>().enumerate() {
        let line = index + 2;
        let record = result
            .with_context(|| format!("line {line}: malformed row"))?
            .into_record(Uuid::new_v4())
            .with_context(|| format!("line {line}: invalid graduation evaluation"))?;
        records.push(record);
    }

    Ok(records)
}

fn required_id(value: &str) -> Result<String, IngestError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IngestError::MissingStudentId);
    }
    Ok(trimmed.to_string())
}

// Missing values default to zero.
fn bounded(field: &'static str, value: Option<f64>, min: f64, max: f64) -> Result<f64, IngestError> {
    let value = value.unwrap_or(0.0);
    if !value.is_finite() {
        return Err(IngestError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(IngestError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

fn credits(field: &'static str, value: i32) -> Result<i32, IngestError> {
    if value < 0 {
        return Err(IngestError::NegativeCredits { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graduation_row() -> GraduationEvaluationRow {
        GraduationEvaluationRow {
            student_id: "S1".to_string(),
            student_name: "Avery Lee".to_string(),
            gpa: Some(3.2),
            total_credits: Some(124),
            required_credits: None,
            thesis_score: Some(81.0),
            final_exam_score: Some(77.5),
            status: None,
            evaluation_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            notes: String::new(),
        }
    }

    #[test]
    fn graduation_defaults_are_applied() {
        let record = graduation_row().into_record(Uuid::new_v4()).unwrap();
        assert_eq!(record.required_credits, DEFAULT_REQUIRED_CREDITS);
        assert_eq!(record.status, GraduationStatus::Pending);
        assert_eq!(record.student_id, "S1");
    }

    #[test]
    fn missing_teacher_numbers_become_zero() {
        let row = TeacherEvaluationRow {
            student_id: " S9 ".to_string(),
            ..Default::default()
        };
        let record = row.into_record(Uuid::new_v4()).unwrap();
        assert_eq!(record.student_id, "S9");
        assert_eq!(record.score, 0.0);
        assert_eq!(record.participation, 0.0);
    }

    #[test]
    fn rejects_gpa_above_scale() {
        let row = GraduationEvaluationRow {
            gpa: Some(4.3),
            ..graduation_row()
        };
        let err = row.into_record(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, IngestError::OutOfRange { field: "gpa", .. }));
    }

    #[test]
    fn rejects_nan_scores() {
        let row = TeacherEvaluationRow {
            student_id: "S1".to_string(),
            score: Some(f64::NAN),
            ..Default::default()
        };
        let err = row.into_record(Uuid::new_v4()).unwrap_err();
        assert_eq!(err, IngestError::NotFinite { field: "score" });
    }

    #[test]
    fn rejects_negative_credits_and_blank_ids() {
        let negative = GraduationEvaluationRow {
            total_credits: Some(-4),
            ..graduation_row()
        };
        assert_eq!(
            negative.into_record(Uuid::new_v4()).unwrap_err(),
            IngestError::NegativeCredits {
                field: "total_credits",
                value: -4
            }
        );

        let blank = GraduationEvaluationRow {
            student_id: "   ".to_string(),
            ..graduation_row()
        };
        assert_eq!(
            blank.into_record(Uuid::new_v4()).unwrap_err(),
            IngestError::MissingStudentId
        );
    }

    #[test]
    fn unknown_status_is_rejected() {
        let row = GraduationEvaluationRow {
            status: Some("graduated".to_string()),
            ..graduation_row()
        };
        assert_eq!(
            row.into_record(Uuid::new_v4()).unwrap_err(),
            IngestError::UnknownStatus("graduated".to_string())
        );
    }

    #[test]
    fn csv_rows_deserialize_with_blank_cells() {
        let data = "student_id,student_name,gpa,total_credits,required_credits,thesis_score,final_exam_score,status,evaluation_date,notes\n\
                    S4,Kiara Patel,2.8,118,,72,64,passed,2026-06-02,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let row: GraduationEvaluationRow = reader.deserialize().next().unwrap().unwrap();
        let record = row.into_record(Uuid::new_v4()).unwrap();

        assert_eq!(record.required_credits, 120);
        assert_eq!(record.status, GraduationStatus::Passed);
        assert_eq!(record.total_credits, 118);
    }

    fn stored_teacher() -> TeacherEvaluation {
        TeacherEvaluation {
            id: Uuid::new_v4(),
            student_id: "S1".to_string(),
            student_name: "Avery Lee".to_string(),
            teacher_name: "Dana Whitfield".to_string(),
            class_code: "CS-301".to_string(),
            score: 70.0,
            attitude: 85.0,
            participation: 90.0,
            feedback: "steady".to_string(),
            evaluation_date: NaiveDate::from_ymd_opt(2026, 5, 12).unwrap(),
        }
    }

    #[test]
    fn teacher_patch_keeps_fields_not_given() {
        let stored = stored_teacher();
        let patch = TeacherEvaluationPatch {
            score: Some(80.0),
            ..Default::default()
        };

        let updated = patch.apply(&stored).unwrap();

        assert_eq!(updated.score, 80.0);
        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.attitude, 85.0);
        assert_eq!(updated.participation, 90.0);
        assert_eq!(updated.evaluation_date, stored.evaluation_date);
        assert_eq!(updated.feedback, "steady");
    }

    #[test]
    fn teacher_patch_still_validates() {
        let patch = TeacherEvaluationPatch {
            attitude: Some(140.0),
            ..Default::default()
        };
        assert!(matches!(
            patch.apply(&stored_teacher()).unwrap_err(),
            IngestError::OutOfRange { field: "attitude", .. }
        ));
    }

    #[test]
    fn graduation_patch_keeps_credits_status_and_date() {
        let stored = GraduationEvaluationRow {
            required_credits: Some(130),
            status: Some("passed".to_string()),
            ..graduation_row()
        }
        .into_record(Uuid::new_v4())
        .unwrap();
        let patch = GraduationEvaluationPatch {
            gpa: Some(3.6),
            ..Default::default()
        };

        let updated = patch.apply(&stored).unwrap();

        assert_eq!(updated.gpa, 3.6);
        assert_eq!(updated.required_credits, 130);
        assert_eq!(updated.total_credits, 124);
        assert_eq!(updated.status, GraduationStatus::Passed);
        assert_eq!(updated.evaluation_date, stored.evaluation_date);
        assert_eq!(updated.id, stored.id);
    }

    #[test]
    fn bad_row_fails_the_whole_file() {
        let data = "student_id,student_name,gpa,total_credits,required_credits,thesis_score,final_exam_score,status,evaluation_date,notes\n\
                    S1,Avery Lee,3.1,128,,72,68,passed,2026-06-02,\n\
                    S2,Jules Moreno,2.4,104,,61,58,pending,2026-06-02,\n\
                    S3,Kiara Patel,4.3,120,,70,70,pending,2026-06-03,\n";

        let err = read_graduation_csv(data.as_bytes()).unwrap_err();

        assert!(format!("{err:#}").contains("line 4"));
    }

    #[test]
    fn teacher_file_keeps_row_order() {
        let data = "student_id,student_name,score,attitude,participation,evaluation_date\n\
                    S1,Avery Lee,50,80,70,2026-05-01\n\
                    S1,Avery Lee,90,80,70,2026-05-20\n";

        let records = read_teacher_csv(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].score, 50.0);
        assert_eq!(records[1].score, 90.0);
    }
}
