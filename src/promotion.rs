use std::collections::HashMap;

use crate::models::{
    FinalResult, GraduationEvaluation, PromotionResult, PromotionSummary, TeacherEvaluation,
};

pub const MIN_TEACHER_SCORE: f64 = 60.0;
pub const MIN_GRADUATION_SCORE: f64 = 60.0;
pub const MIN_GPA: f64 = 2.0;

pub const ALL_CONDITIONS_MET: &str = "all promotion conditions satisfied";
pub const NO_TEACHER_EVALUATION: &str = "no teacher evaluation yet";
pub const NO_GRADUATION_EVALUATION: &str = "no graduation evaluation yet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    StudentId,
    Name,
    Date,
}

/// Reduces `records` to one entry per student id. A later record for the same
/// student replaces an earlier one; keys keep the position of their first
/// appearance.
pub fn latest_per_student<'a, T>(records: &'a [T], key: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut latest: Vec<&T> = Vec::new();

    for record in records {
        let student_id = key(record);
        match positions.get(student_id) {
            Some(&slot) => latest[slot] = record,
            None => {
                positions.insert(student_id, latest.len());
                latest.push(record);
            }
        }
    }

    latest
}

/// Merges teacher and graduation evaluations into one promotion decision per
/// student. Neither input is modified; the same inputs always give the same
/// output.
pub fn compute_promotion_results(
    teacher_evaluations: &[TeacherEvaluation],
    graduation_evaluations: &[GraduationEvaluation],
) -> Vec<PromotionResult> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut results: Vec<PromotionResult> = Vec::new();

    for te in latest_per_student(teacher_evaluations, |te| te.student_id.as_str()) {
        positions.insert(te.student_id.as_str(), results.len());
        results.push(PromotionResult {
            student_id: te.student_id.clone(),
            student_name: te.student_name.clone(),
            teacher_score: round_one_decimal(te.score),
            teacher_attitude: te.attitude,
            teacher_participation: te.participation,
            graduation_gpa: 0.0,
            graduation_credits: 0,
            graduation_status: None,
            final_result: FinalResult::Fail,
            reason: NO_GRADUATION_EVALUATION.to_string(),
            evaluation_date: te.evaluation_date,
        });
    }

    for ge in latest_per_student(graduation_evaluations, |ge| ge.student_id.as_str()) {
        match positions.get(ge.student_id.as_str()) {
            Some(&slot) => {
                let entry = &mut results[slot];
                let failures = failing_conditions(entry.teacher_score, ge);

                entry.graduation_gpa = ge.gpa;
                entry.graduation_credits = ge.total_credits;
                entry.graduation_status = Some(ge.status);
                entry.evaluation_date = ge.evaluation_date;
                if failures.is_empty() {
                    entry.final_result = FinalResult::Pass;
                    entry.reason = ALL_CONDITIONS_MET.to_string();
                } else {
                    entry.final_result = FinalResult::Fail;
                    entry.reason = failures.join("; ");
                }
            }
            None => {
                positions.insert(ge.student_id.as_str(), results.len());
                results.push(PromotionResult {
                    student_id: ge.student_id.clone(),
                    student_name: ge.student_name.clone(),
                    teacher_score: 0.0,
                    teacher_attitude: 0.0,
                    teacher_participation: 0.0,
                    graduation_gpa: ge.gpa,
                    graduation_credits: ge.total_credits,
                    graduation_status: Some(ge.status),
                    final_result: FinalResult::Fail,
                    reason: NO_TEACHER_EVALUATION.to_string(),
                    evaluation_date: ge.evaluation_date,
                });
            }
        }
    }

    results
}

/// One clause per unmet condition, in a fixed order.
fn failing_conditions(teacher_score: f64, ge: &GraduationEvaluation) -> Vec<String> {
    let mut reasons = Vec::new();
    let graduation_score = (ge.thesis_score + ge.final_exam_score) / 2.0;

    if !meets(teacher_score, MIN_TEACHER_SCORE) {
        reasons.push(format!("teacher score too low ({teacher_score})"));
    }
    if !meets(graduation_score, MIN_GRADUATION_SCORE) {
        reasons.push(format!("graduation score too low ({graduation_score})"));
    }
    if !meets(ge.gpa, MIN_GPA) {
        reasons.push(format!("GPA insufficient ({})", ge.gpa));
    }
    if ge.total_credits < ge.required_credits {
        reasons.push(format!(
            "credits insufficient ({}/{})",
            ge.total_credits, ge.required_credits
        ));
    }

    reasons
}

/// Inclusive threshold check. NaN never meets a threshold.
fn meets(value: f64, min: f64) -> bool {
    value >= min
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn summarize(results: &[PromotionResult]) -> PromotionSummary {
    let total = results.len();
    let passed = results
        .iter()
        .filter(|r| r.final_result == FinalResult::Pass)
        .count();
    let pass_rate_pct = if total == 0 {
        0
    } else {
        (passed as f64 / total as f64 * 100.0).round() as u32
    };

    PromotionSummary {
        passed,
        failed: total - passed,
        total,
        pass_rate_pct,
    }
}

pub fn sort_results(results: &mut [PromotionResult], key: SortKey) {
    match key {
        SortKey::StudentId => results.sort_by(|a, b| a.student_id.cmp(&b.student_id)),
        SortKey::Name => results.sort_by(|a, b| {
            a.student_name
                .cmp(&b.student_name)
                .then_with(|| a.student_id.cmp(&b.student_id))
        }),
        SortKey::Date => results.sort_by(|a, b| {
            b.evaluation_date
                .cmp(&a.evaluation_date)
                .then_with(|| a.student_id.cmp(&b.student_id))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GraduationStatus;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    fn teacher(student_id: &str, score: f64) -> TeacherEvaluation {
        TeacherEvaluation {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            student_name: format!("Student {student_id}"),
            teacher_name: "Dana Whitfield".to_string(),
            class_code: "CS-301".to_string(),
            score,
            attitude: 80.0,
            participation: 70.0,
            feedback: String::new(),
            evaluation_date: date(1),
        }
    }

    fn graduation(student_id: &str, gpa: f64, total_credits: i32) -> GraduationEvaluation {
        GraduationEvaluation {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            student_name: format!("Student {student_id}"),
            gpa,
            total_credits,
            required_credits: 120,
            thesis_score: 70.0,
            final_exam_score: 65.0,
            status: GraduationStatus::Pending,
            evaluation_date: date(20),
            notes: String::new(),
        }
    }

    #[test]
    fn passes_when_all_conditions_hold() {
        let results =
            compute_promotion_results(&[teacher("S1", 75.0)], &[graduation("S1", 3.0, 130)]);

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.final_result, FinalResult::Pass);
        assert_eq!(result.reason, ALL_CONDITIONS_MET);
        assert_eq!(result.teacher_score, 75.0);
        assert_eq!(result.teacher_attitude, 80.0);
        assert_eq!(result.graduation_gpa, 3.0);
        assert_eq!(result.graduation_credits, 130);
        assert_eq!(result.graduation_status, Some(GraduationStatus::Pending));
        assert_eq!(result.evaluation_date, date(20));
    }

    #[test]
    fn missing_credits_is_the_only_clause() {
        let results =
            compute_promotion_results(&[teacher("S1", 75.0)], &[graduation("S1", 3.0, 100)]);

        assert_eq!(results[0].final_result, FinalResult::Fail);
        assert_eq!(results[0].reason, "credits insufficient (100/120)");
    }

    #[test]
    fn every_failing_condition_is_listed_in_order() {
        let mut ge = graduation("S1", 1.5, 90);
        ge.thesis_score = 40.0;
        ge.final_exam_score = 50.0;

        let results = compute_promotion_results(&[teacher("S1", 55.0)], &[ge]);

        assert_eq!(
            results[0].reason,
            "teacher score too low (55); graduation score too low (45); \
             GPA insufficient (1.5); credits insufficient (90/120)"
        );
    }

    #[test]
    fn graduation_only_student_gets_zeroed_teacher_fields() {
        let results = compute_promotion_results(&[], &[graduation("S2", 3.5, 140)]);

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.final_result, FinalResult::Fail);
        assert_eq!(result.reason, NO_TEACHER_EVALUATION);
        assert_eq!(result.teacher_score, 0.0);
        assert_eq!(result.teacher_attitude, 0.0);
        assert_eq!(result.teacher_participation, 0.0);
        assert_eq!(result.graduation_gpa, 3.5);
    }

    #[test]
    fn teacher_only_student_fails_by_default() {
        let results = compute_promotion_results(&[teacher("S3", 95.0)], &[]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].final_result, FinalResult::Fail);
        assert_eq!(results[0].reason, NO_GRADUATION_EVALUATION);
        assert_eq!(results[0].graduation_status, None);
        assert_eq!(results[0].evaluation_date, date(1));
    }

    #[test]
    fn one_result_per_distinct_student() {
        let teachers = vec![teacher("S1", 75.0), teacher("S2", 80.0)];
        let graduations = vec![graduation("S3", 3.0, 130), graduation("S4", 2.5, 125)];

        let results = compute_promotion_results(&teachers, &graduations);

        assert_eq!(results.len(), 4);
        let ids: Vec<&str> = results.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S3", "S4"]);
    }

    #[test]
    fn later_teacher_record_wins() {
        let teachers = vec![teacher("S1", 50.0), teacher("S1", 90.0)];

        let results = compute_promotion_results(&teachers, &[graduation("S1", 3.0, 130)]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].teacher_score, 90.0);
        assert_eq!(results[0].final_result, FinalResult::Pass);
    }

    #[test]
    fn later_graduation_record_wins() {
        let graduations = vec![graduation("S1", 3.0, 130), graduation("S1", 1.0, 130)];

        let results = compute_promotion_results(&[teacher("S1", 75.0)], &graduations);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].graduation_gpa, 1.0);
        assert_eq!(results[0].reason, "GPA insufficient (1)");
    }

    #[test]
    fn gpa_threshold_is_inclusive() {
        let at_threshold =
            compute_promotion_results(&[teacher("S1", 75.0)], &[graduation("S1", 2.0, 130)]);
        let below =
            compute_promotion_results(&[teacher("S1", 75.0)], &[graduation("S1", 1.999, 130)]);

        assert_eq!(at_threshold[0].final_result, FinalResult::Pass);
        assert_eq!(below[0].final_result, FinalResult::Fail);
        assert_eq!(below[0].reason, "GPA insufficient (1.999)");
    }

    #[test]
    fn teacher_score_is_rounded_before_comparison() {
        let results =
            compute_promotion_results(&[teacher("S1", 59.96)], &[graduation("S1", 3.0, 130)]);

        assert_eq!(results[0].teacher_score, 60.0);
        assert_eq!(results[0].final_result, FinalResult::Pass);
    }

    #[test]
    fn nan_inputs_fail_their_condition() {
        let mut ge = graduation("S1", f64::NAN, 130);
        ge.thesis_score = f64::NAN;

        let results = compute_promotion_results(&[teacher("S1", f64::NAN)], &[ge]);

        assert_eq!(results[0].final_result, FinalResult::Fail);
        assert_eq!(results[0].reason.split("; ").count(), 3);
    }

    #[test]
    fn thresholds_are_inclusive_and_reject_nan() {
        assert!(meets(60.0, MIN_TEACHER_SCORE));
        assert!(!meets(59.9, MIN_TEACHER_SCORE));
        assert!(!meets(f64::NAN, MIN_GPA));
        assert!(!meets(f64::NAN, f64::NEG_INFINITY));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let teachers = vec![teacher("S1", 75.0), teacher("S2", 40.0)];
        let graduations = vec![graduation("S1", 3.0, 130), graduation("S5", 2.0, 10)];

        let first = compute_promotion_results(&teachers, &graduations);
        let second = compute_promotion_results(&teachers, &graduations);

        assert_eq!(first, second);
    }

    #[test]
    fn latest_per_student_keeps_first_seen_order() {
        let records = vec![("a", 1), ("b", 2), ("a", 3)];

        let latest = latest_per_student(&records, |r| r.0);

        assert_eq!(latest, vec![&("a", 3), &("b", 2)]);
    }

    #[test]
    fn summary_counts_and_rounds_rate() {
        let teachers = vec![teacher("S1", 75.0), teacher("S2", 75.0), teacher("S3", 75.0)];
        let graduations = vec![graduation("S1", 3.0, 130), graduation("S2", 3.0, 130)];

        let summary = summarize(&compute_promotion_results(&teachers, &graduations));

        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.pass_rate_pct, 67);
    }

    #[test]
    fn empty_summary_has_zero_rate() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.pass_rate_pct, 0);
    }

    #[test]
    fn sort_by_name_orders_alphabetically() {
        let mut results = compute_promotion_results(
            &[teacher("S2", 75.0), teacher("S1", 75.0)],
            &[],
        );

        sort_results(&mut results, SortKey::Name);

        assert_eq!(results[0].student_id, "S1");
        assert_eq!(results[1].student_id, "S2");
    }
}
