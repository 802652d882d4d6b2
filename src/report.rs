use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Gradebook;
use crate::error::AggregationFailure;
use crate::grading::GradeAggregator;
use crate::models::{AggregationMode, GradeBand, Member, StudentGradeResult};

/// Grades every active student of a course, or fails as a whole.
pub fn compute_course_grades<G>(
    course_id: &str,
    mode: AggregationMode,
    gradebook: &G,
) -> Result<Vec<StudentGradeResult>, AggregationFailure>
where
    G: Gradebook + ?Sized,
{
    let assignments = gradebook
        .counted_assignments(course_id)
        .map_err(AggregationFailure::course)?;
    let members = gradebook
        .members(course_id)
        .map_err(AggregationFailure::course)?;
    let aggregator = GradeAggregator::new(gradebook, course_id, mode, &assignments);

    let mut results = Vec::new();
    for member in members.iter().filter(|m| m.is_active_student()) {
        match aggregator.compute(&member.student_id) {
            Ok(result) => results.push(result),
            Err(failure) => {
                warn!(
                    course_id,
                    student_id = member.student_id.as_str(),
                    error = %failure.error,
                    "course grade computation aborted"
                );
                return Err(failure);
            }
        }
    }

    info!(
        course_id,
        mode = mode.label(),
        assignments = assignments.len(),
        students = results.len(),
        "computed course grades"
    );
    Ok(results)
}

const BANDS: [(&str, i64); 6] = [
    ("90-100", 90),
    ("80-89", 80),
    ("70-79", 70),
    ("60-69", 60),
    ("50-59", 50),
    ("below 50", i64::MIN),
];

pub fn summarize_by_band(results: &[StudentGradeResult]) -> Vec<GradeBand> {
    let mut counts = [0usize; BANDS.len()];
    for result in results {
        if let Some(index) = BANDS
            .iter()
            .position(|(_, floor)| result.rounded_grade >= *floor)
        {
            counts[index] += 1;
        }
    }

    BANDS
        .iter()
        .zip(counts)
        .map(|((label, _), count)| GradeBand {
            label: label.to_string(),
            count,
        })
        .collect()
}

pub fn mean_percentage(results: &[StudentGradeResult]) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    let total: f64 = results.iter().map(|r| r.percentage).sum();
    Some(total / results.len() as f64)
}

fn display_ids(members: &[Member]) -> HashMap<&str, &str> {
    members
        .iter()
        .filter(|m| !m.display_id.is_empty())
        .map(|m| (m.student_id.as_str(), m.display_id.as_str()))
        .collect()
}

pub fn build_report(
    course_id: &str,
    title: &str,
    mode: AggregationMode,
    generated_at: DateTime<Utc>,
    members: &[Member],
    results: &[StudentGradeResult],
) -> String {
    let bands = summarize_by_band(results);
    let ids = display_ids(members);

    let mut output = String::new();
    let title_label = if title.is_empty() { course_id } else { title };

    let _ = writeln!(output, "# Course Grade Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) on {}",
        title_label,
        course_id,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output, "Aggregation: {}", mode.label());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");

    match mean_percentage(results) {
        None => {
            let _ = writeln!(output, "No active students in this course.");
        }
        Some(mean) => {
            let _ = writeln!(output, "{} students, mean {:.1}%", results.len(), mean);
            for band in bands.iter().filter(|b| b.count > 0) {
                let _ = writeln!(output, "- {}: {} students", band.label, band.count);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Grades");

    if results.is_empty() {
        let _ = writeln!(output, "No grades computed.");
    } else {
        let _ = writeln!(output, "| Student | Percentage | Grade |");
        let _ = writeln!(output, "| --- | ---: | ---: |");
        for result in results {
            let id = ids
                .get(result.student_id.as_str())
                .copied()
                .unwrap_or(result.student_id.as_str());
            let marker = if result.overridden { " (override)" } else { "" };
            let _ = writeln!(
                output,
                "| {} | {:.2} | {}{} |",
                id, result.percentage, result.rounded_grade, marker
            );
        }
    }

    let overridden: Vec<&StudentGradeResult> = results.iter().filter(|r| r.overridden).collect();
    if !overridden.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Manual Overrides");
        for result in overridden {
            let id = ids
                .get(result.student_id.as_str())
                .copied()
                .unwrap_or(result.student_id.as_str());
            let _ = writeln!(output, "- {} forced to {}%", id, result.percentage);
        }
    }

    output
}

#[derive(Serialize)]
struct GradeRow<'a> {
    student_id: &'a str,
    display_id: &'a str,
    percentage: f64,
    rounded_grade: i64,
    overridden: bool,
}

pub fn write_csv<W: std::io::Write>(
    writer: W,
    members: &[Member],
    results: &[StudentGradeResult],
) -> anyhow::Result<()> {
    let ids = display_ids(members);
    let mut csv = csv::Writer::from_writer(writer);
    for result in results {
        csv.serialize(GradeRow {
            student_id: &result.student_id,
            display_id: ids.get(result.student_id.as_str()).copied().unwrap_or(""),
            percentage: result.percentage,
            rounded_grade: result.rounded_grade,
            overridden: result.overridden,
        })?;
    }
    csv.flush()?;
    Ok(())
}
