use std::fmt::Write;
use std::io;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{FinalResult, PromotionResult};
use crate::promotion;

/// Flat row used for CSV export; the csv writer cannot serialize `Option` of
/// an enum into a single column on its own.
#[derive(Serialize)]
struct ExportRow<'a> {
    student_id: &'a str,
    student_name: &'a str,
    teacher_score: f64,
    teacher_attitude: f64,
    teacher_participation: f64,
    graduation_gpa: f64,
    graduation_credits: i32,
    graduation_status: &'a str,
    final_result: &'a str,
    reason: &'a str,
    evaluation_date: NaiveDate,
}

impl<'a> From<&'a PromotionResult> for ExportRow<'a> {
    fn from(result: &'a PromotionResult) -> Self {
        ExportRow {
            student_id: &result.student_id,
            student_name: &result.student_name,
            teacher_score: result.teacher_score,
            teacher_attitude: result.teacher_attitude,
            teacher_participation: result.teacher_participation,
            graduation_gpa: result.graduation_gpa,
            graduation_credits: result.graduation_credits,
            graduation_status: result.graduation_status.map_or("", |s| s.as_str()),
            final_result: result.final_result.as_str(),
            reason: &result.reason,
            evaluation_date: result.evaluation_date,
        }
    }
}

pub fn build_report(results: &[PromotionResult], generated_on: NaiveDate) -> String {
    let summary = promotion::summarize(results);
    let mut output = String::new();

    let _ = writeln!(output, "# Promotion Review Report");
    let _ = writeln!(output, "Generated on {generated_on}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Passed: {}", summary.passed);
    let _ = writeln!(output, "- Failed: {}", summary.failed);
    let _ = writeln!(output, "- Total: {}", summary.total);
    let _ = writeln!(output, "- Pass rate: {}%", summary.pass_rate_pct);

    let (passed, failed): (Vec<&PromotionResult>, Vec<&PromotionResult>) = results
        .iter()
        .partition(|r| r.final_result == FinalResult::Pass);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Not Promoted");

    if failed.is_empty() {
        let _ = writeln!(output, "Every evaluated student met the promotion conditions.");
    } else {
        for result in failed {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                result.student_name, result.student_id, result.reason
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Promoted");

    if passed.is_empty() {
        let _ = writeln!(output, "No students met the promotion conditions.");
    } else {
        for result in passed {
            let _ = writeln!(
                output,
                "- {} ({}) teacher score {}, GPA {:.2}, {} credits, evaluated {}",
                result.student_name,
                result.student_id,
                result.teacher_score,
                result.graduation_gpa,
                result.graduation_credits,
                result.evaluation_date
            );
        }
    }

    output
}

pub fn write_csv<W: io::Write>(results: &[PromotionResult], writer: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for result in results {
        writer.serialize(ExportRow::from(result))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<W: io::Write>(results: &[PromotionResult], writer: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(writer, results)?;
    Ok(())
}
