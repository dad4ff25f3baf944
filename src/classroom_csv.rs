// GitHub Classroom CSV import and summary export.
// Turns a Classroom "grades" export into student records and writes a per-student summary sheet.

use std::io::{Read, Write};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::course::Course;
use crate::error::Result;
use crate::resolver;
use crate::student::{AssignmentResult, AssignmentStatus, Student};

/// One row of a Classroom grades export. Columns not listed here are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeRow {
    pub assignment_name: String,
    pub github_username: String,
    #[serde(default)]
    pub student_repository_name: Option<String>,
    #[serde(default)]
    pub submission_timestamp: Option<String>,
    #[serde(default)]
    pub points_awarded: Option<f64>,
    #[serde(default)]
    pub points_available: Option<f64>,
}

/// Parse every row of a grades export.
pub fn read_grades_csv<R: Read>(reader: R) -> Result<Vec<GradeRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Classroom writes `2024-02-01 18:25:57 UTC`; RFC 3339 is accepted too.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S UTC")
        .ok()
        .map(|naive| naive.and_utc())
}

fn slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Status implied by the points columns.
pub fn row_status(row: &GradeRow) -> AssignmentStatus {
    let has_repo = row
        .student_repository_name
        .as_deref()
        .is_some_and(|name| !name.trim().is_empty());
    if !has_repo {
        return AssignmentStatus::NotStarted;
    }
    match (row.points_awarded, row.points_available) {
        (_, None) => AssignmentStatus::NoTests,
        (_, Some(available)) if available <= 0.0 => AssignmentStatus::NoTests,
        (Some(awarded), Some(available)) if awarded >= available => AssignmentStatus::Success,
        _ => AssignmentStatus::Failure,
    }
}

/// Course assignment a row belongs to: from the repository name when it
/// resolves, otherwise from the assignment title.
fn row_assignment(row: &GradeRow, course: &Course) -> Option<String> {
    let from_repo = row
        .student_repository_name
        .as_deref()
        .and_then(|name| resolver::resolve_repo(name.trim(), course))
        .map(|resolved| resolved.assignment);
    if from_repo.is_some() {
        return from_repo;
    }

    let from_title = slug(&row.assignment_name);
    resolver::is_known_assignment(&from_title, course)
        .then(|| resolver::canonical_assignment(&from_title, course))
}

/// Convert rows into (username, result) pairs, skipping rows for unknown
/// assignments or without a username.
pub fn results_from_grades(rows: &[GradeRow], course: &Course) -> Vec<(String, AssignmentResult)> {
    rows.iter()
        .filter_map(|row| {
            let username = row.github_username.trim();
            if username.is_empty() {
                debug!(assignment = %row.assignment_name, "skipping row without a username");
                return None;
            }
            let Some(assignment) = row_assignment(row, course) else {
                warn!(assignment = %row.assignment_name, %username, "skipping row for unknown assignment");
                return None;
            };

            Some((
                username.to_string(),
                AssignmentResult {
                    assignment_name: assignment,
                    repo_name: row
                        .student_repository_name
                        .clone()
                        .unwrap_or_default(),
                    status: row_status(row),
                    last_commit_date: row
                        .submission_timestamp
                        .as_deref()
                        .and_then(parse_timestamp),
                    last_commit_message: None,
                    workflow_status: match (row.points_awarded, row.points_available) {
                        (Some(awarded), Some(available)) => {
                            Some(format!("{}/{}", awarded, available))
                        }
                        _ => None,
                    },
                },
            ))
        })
        .collect()
}

/// Student records from a grades export, reduced with the course rules.
pub fn students_from_grades(rows: &[GradeRow], course: &Course) -> Vec<Student> {
    resolver::build_students(results_from_grades(rows, course), course)
}

const COMPLETE_MARK: &str = "\u{2713}";

/// Write one summary row per student with a column per course entry.
pub fn write_summary_csv<W: Write>(writer: W, students: &[Student], course: &Course) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![
        "username".to_string(),
        "display_name".to_string(),
        "status".to_string(),
        "completed".to_string(),
        "total".to_string(),
        "progress_percentage".to_string(),
        "last_active".to_string(),
    ];
    header.extend(course.entries.iter().map(|entry| entry.label()));
    csv_writer.write_record(&header)?;

    for student in students {
        let mut record = vec![
            student.username.clone(),
            student.display_name.clone(),
            student.status.to_string(),
            student.completed_count.to_string(),
            student.total_assignments.to_string(),
            student.progress_percentage.to_string(),
            student
                .last_active
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
        ];
        record.extend(
            resolver::entry_progress(student, course)
                .into_iter()
                .map(|entry| {
                    let mark = if entry.complete { COMPLETE_MARK } else { "" };
                    mark.to_string()
                }),
        );
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}
