// grade-manager library.
// Course progress for GitHub Classroom organizations, served through a three-tier cache.

pub mod cache;
pub mod classroom_csv;
pub mod config;
pub mod course;
pub mod error;
pub mod github;
pub mod logging;
pub mod quiz;
pub mod resolver;
pub mod student;
pub mod sync;

pub use course::{AssignmentEntry, ChoiceOption, Course};
pub use error::{GradeError, Result};
pub use student::{AssignmentResult, AssignmentStatus, Student, StudentDetails, StudentStatus};
