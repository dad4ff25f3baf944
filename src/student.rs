// Student and assignment result records.
// These are the payloads every cache tier stores and the shape checks applied at tier boundaries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one assignment repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Success,
    Failure,
    InProgress,
    NotStarted,
    NoTests,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Success => "success",
            AssignmentStatus::Failure => "failure",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::NotStarted => "not_started",
            AssignmentStatus::NoTests => "no_tests",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Overall standing of a student in the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Passed,
    InProgress,
    Failed,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Passed => "passed",
            StudentStatus::InProgress => "in_progress",
            StudentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result for one repository that resolved to a known assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResult {
    pub assignment_name: String,
    pub repo_name: String,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub last_commit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_commit_message: Option<String>,
    #[serde(default)]
    pub workflow_status: Option<String>,
}

/// A student's aggregated course progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(alias = "id")]
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub assignments: Vec<AssignmentResult>,
    pub completed_count: usize,
    pub total_assignments: usize,
    pub progress_percentage: u8,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    pub status: StudentStatus,
}

impl Student {
    /// Result for a given assignment id, if the student has a repository for it.
    pub fn assignment(&self, name: &str) -> Option<&AssignmentResult> {
        self.assignments.iter().find(|a| a.assignment_name == name)
    }
}

/// Completion of a single course entry for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryProgress {
    pub label: String,
    pub kind: String,
    pub complete: bool,
    /// The assignment id that satisfied the entry.
    #[serde(default)]
    pub satisfied_by: Option<String>,
}

/// A student together with the per-entry course breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetails {
    pub student: Student,
    pub entries: Vec<EntryProgress>,
}

/// Check the semantic shape of a student list beyond what deserialization enforces.
///
/// Returns a description of the first problem found.
pub fn validate_students(students: &[Student]) -> Result<(), String> {
    let mut total: Option<usize> = None;

    for student in students {
        if student.username.trim().is_empty() {
            return Err("student with empty username".to_string());
        }
        if student.completed_count > student.total_assignments {
            return Err(format!(
                "{}: completed {} exceeds total {}",
                student.username, student.completed_count, student.total_assignments
            ));
        }
        if student.progress_percentage > 100 {
            return Err(format!(
                "{}: progress {}%",
                student.username, student.progress_percentage
            ));
        }
        match total {
            None => total = Some(student.total_assignments),
            Some(t) if t != student.total_assignments => {
                return Err(format!(
                    "{}: total {} differs from {}",
                    student.username, student.total_assignments, t
                ));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn student(username: &str, completed: usize, total: usize) -> Student {
        Student {
            username: username.to_string(),
            display_name: username.to_string(),
            avatar_url: format!("https://github.com/{}.png", username),
            assignments: vec![AssignmentResult {
                assignment_name: "hello".to_string(),
                repo_name: format!("org-hello-{}", username),
                status: AssignmentStatus::Success,
                last_commit_date: None,
                last_commit_message: Some("done".to_string()),
                workflow_status: Some("completed".to_string()),
            }],
            completed_count: completed,
            total_assignments: total,
            progress_percentage: if total == 0 {
                0
            } else {
                ((completed * 100) as f64 / total as f64).round() as u8
            },
            last_active: None,
            status: if completed == total {
                StudentStatus::Passed
            } else {
                StudentStatus::InProgress
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::student;
    use super::*;

    #[test]
    fn serializes_with_camel_case_fields() {
        let value = serde_json::to_value(student("alice", 1, 14)).unwrap();
        assert_eq!(value["completedCount"], 1);
        assert_eq!(value["totalAssignments"], 14);
        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["assignments"][0]["assignmentName"], "hello");
    }

    #[test]
    fn accepts_id_as_username_alias() {
        let mut value = serde_json::to_value(student("bob", 0, 14)).unwrap();
        let username = value["username"].take();
        value.as_object_mut().unwrap().remove("username");
        value["id"] = username;
        let parsed: Student = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.username, "bob");
    }

    #[test]
    fn validation_rejects_inconsistent_counts() {
        assert!(validate_students(&[student("a", 3, 14), student("b", 14, 14)]).is_ok());

        let mut broken = student("a", 3, 14);
        broken.completed_count = 15;
        assert!(validate_students(&[broken]).is_err());

        assert!(validate_students(&[student("a", 1, 14), student("b", 1, 13)]).is_err());
        assert!(validate_students(&[student(" ", 1, 14)]).is_err());
    }
}
