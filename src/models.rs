use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherEvaluation {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub teacher_name: String,
    pub class_code: String,
    pub score: f64,
    pub attitude: f64,
    pub participation: f64,
    pub feedback: String,
    pub evaluation_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraduationEvaluation {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub gpa: f64,
    pub total_credits: i32,
    pub required_credits: i32,
    pub thesis_score: f64,
    pub final_exam_score: f64,
    pub status: GraduationStatus,
    pub evaluation_date: NaiveDate,
    pub notes: String,
}

/// Status recorded on a graduation evaluation by whoever entered it. It is
/// carried through to promotion results but never consulted by the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraduationStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl GraduationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GraduationStatus::Pending => "pending",
            GraduationStatus::Passed => "passed",
            GraduationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for GraduationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraduationStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(GraduationStatus::Pending),
            "passed" => Ok(GraduationStatus::Passed),
            "failed" => Ok(GraduationStatus::Failed),
            other => anyhow::bail!("unknown graduation status '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalResult {
    Pass,
    Fail,
}

impl FinalResult {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalResult::Pass => "pass",
            FinalResult::Fail => "fail",
        }
    }
}

impl fmt::Display for FinalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionResult {
    pub student_id: String,
    pub student_name: String,
    pub teacher_score: f64,
    pub teacher_attitude: f64,
    pub teacher_participation: f64,
    pub graduation_gpa: f64,
    pub graduation_credits: i32,
    pub graduation_status: Option<GraduationStatus>,
    pub final_result: FinalResult,
    pub reason: String,
    pub evaluation_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromotionSummary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub pass_rate_pct: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Viewer,
}

impl Role {
    pub fn can_write(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Viewer => "viewer",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "viewer" => Ok(Role::Viewer),
            other => anyhow::bail!("unknown role '{other}'"),
        }
    }
}

/// Identity of whoever is driving the store. Passed to every write so the
/// activity log can attribute it.
#[derive(Debug, Clone)]
pub struct Actor {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Import,
    Export,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Create => "CREATE",
            ActionType::Update => "UPDATE",
            ActionType::Delete => "DELETE",
            ActionType::Import => "IMPORT",
            ActionType::Export => "EXPORT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLogEntry {
    pub username: String,
    pub user_role: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub description: String,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "Passed".parse::<GraduationStatus>().unwrap(),
            GraduationStatus::Passed
        );
        assert_eq!(
            " pending ".parse::<GraduationStatus>().unwrap(),
            GraduationStatus::Pending
        );
        assert!("graduated".parse::<GraduationStatus>().is_err());
    }

    #[test]
    fn only_viewers_are_read_only() {
        assert!(Role::Admin.can_write());
        assert!(Role::Teacher.can_write());
        assert!(!Role::Viewer.can_write());
        assert_eq!("TEACHER".parse::<Role>().unwrap(), Role::Teacher);
    }

    #[test]
    fn final_result_serializes_as_token() {
        let json = serde_json::to_string(&FinalResult::Pass).unwrap();
        assert_eq!(json, "\"pass\"");
        assert_eq!(FinalResult::Fail.to_string(), "fail");
    }
}
