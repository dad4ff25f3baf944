// Repository name resolution and completion rules.
// Maps `<prefix><assignment>-<username>` repositories onto course entries and reduces results per student.

use std::collections::{BTreeMap, HashSet};

use crate::course::{AssignmentEntry, Course};
use crate::github::{Commit, RunConclusion, RunStatus, WorkflowRun};
use crate::student::{
    AssignmentResult, AssignmentStatus, EntryProgress, Student, StudentStatus,
};

const SEPARATOR: char = '-';

/// A repository that mapped onto a known assignment and a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepo {
    pub repo_name: String,
    /// Canonical assignment id (alternative names are folded into their entry's name).
    pub assignment: String,
    pub username: String,
}

/// All assignment identifiers of a course in match order.
///
/// Longest candidates come first so `mario-less` wins over a shorter `mario`.
/// Candidates of equal length are ordered lexicographically, which fixes the
/// tie-break independently of how the course lists its entries.
pub fn candidates(course: &Course) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut out: Vec<&str> = course
        .entries
        .iter()
        .flat_map(|entry| entry.identifiers())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .collect();
    out.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    out
}

fn strip_org_prefix<'a>(repo_name: &'a str, course: &Course) -> &'a str {
    if course.org_prefix.is_empty() {
        return repo_name;
    }
    repo_name
        .strip_prefix(course.org_prefix.as_str())
        .unwrap_or(repo_name)
}

fn matches_candidate(remainder: &str, candidate: &str) -> bool {
    match remainder.strip_prefix(candidate) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Assignment id encoded in a repository name.
///
/// Falls back to the first `-` segment when no known identifier matches.
/// Returns `None` when the name (after the prefix) has fewer than two segments.
pub fn parse_assignment_name(repo_name: &str, course: &Course) -> Option<String> {
    let cleaned = strip_org_prefix(repo_name, course);
    let segments: Vec<&str> = cleaned.split(SEPARATOR).collect();
    if segments.len() < 2 {
        return None;
    }

    if let Some(candidate) = candidates(course)
        .into_iter()
        .find(|candidate| matches_candidate(cleaned, candidate))
    {
        return Some(candidate.to_string());
    }

    segments
        .first()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
}

/// Username encoded in a repository name: whatever follows the assignment id.
pub fn extract_username(repo_name: &str, course: &Course) -> Option<String> {
    let assignment = parse_assignment_name(repo_name, course)?;
    let cleaned = strip_org_prefix(repo_name, course);
    let rest = cleaned.strip_prefix(assignment.as_str())?;
    let username = rest.strip_prefix(SEPARATOR).unwrap_or(rest);
    if username.is_empty() {
        None
    } else {
        Some(username.to_string())
    }
}

/// Whether an assignment id names any slot of the course.
pub fn is_known_assignment(id: &str, course: &Course) -> bool {
    course
        .entries
        .iter()
        .any(|entry| entry.identifiers().contains(&id))
}

/// Fold an alternative name onto its entry's canonical name.
///
/// Choice options stay distinct since each one is its own assignment.
pub fn canonical_assignment(id: &str, course: &Course) -> String {
    for entry in &course.entries {
        if let AssignmentEntry::Required {
            name,
            alternative_names,
        } = entry
        {
            if alternative_names.iter().any(|alt| alt == id) {
                return name.clone();
            }
        }
    }
    id.to_string()
}

/// Resolve a repository to (assignment, username), or `None` for repositories
/// that are not student submissions of this course.
pub fn resolve_repo(repo_name: &str, course: &Course) -> Option<ResolvedRepo> {
    let assignment = parse_assignment_name(repo_name, course)?;
    if !is_known_assignment(&assignment, course) {
        return None;
    }
    let username = extract_username(repo_name, course)?;
    Some(ResolvedRepo {
        repo_name: repo_name.to_string(),
        assignment: canonical_assignment(&assignment, course),
        username,
    })
}

/// Status of one assignment from its latest workflow run and latest commit.
///
/// Commit content is never consulted, only its presence.
pub fn determine_status(
    run: Option<&WorkflowRun>,
    commit: Option<&Commit>,
) -> AssignmentStatus {
    if commit.is_none() {
        return AssignmentStatus::NotStarted;
    }
    let Some(run) = run else {
        return AssignmentStatus::NoTests;
    };
    if matches!(run.status, RunStatus::InProgress | RunStatus::Queued) {
        return AssignmentStatus::InProgress;
    }
    if run.conclusion == Some(RunConclusion::Success) {
        AssignmentStatus::Success
    } else {
        AssignmentStatus::Failure
    }
}

fn success_set(results: &[AssignmentResult]) -> HashSet<&str> {
    results
        .iter()
        .filter(|r| r.status == AssignmentStatus::Success)
        .map(|r| r.assignment_name.as_str())
        .collect()
}

/// The identifier that completes an entry, if any.
fn satisfying_id<'a>(entry: &'a AssignmentEntry, successes: &HashSet<&str>) -> Option<&'a str> {
    entry
        .identifiers()
        .into_iter()
        .find(|id| successes.contains(id))
}

/// Number of course entries a set of results completes.
///
/// A required entry counts when its name or an alternative succeeded; a choice
/// group counts once when any of its options succeeded. Always walks the full
/// course so untouched entries count as incomplete.
pub fn reduce_completion(results: &[AssignmentResult], course: &Course) -> usize {
    let successes = success_set(results);
    course
        .entries
        .iter()
        .filter(|entry| satisfying_id(entry, &successes).is_some())
        .count()
}

pub fn progress_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (100.0 * completed as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// `passed` when everything is complete, otherwise `failed` if any result
/// failed, otherwise `in_progress`.
pub fn overall_status(
    completed: usize,
    total: usize,
    results: &[AssignmentResult],
) -> StudentStatus {
    if completed == total {
        StudentStatus::Passed
    } else if results
        .iter()
        .any(|r| r.status == AssignmentStatus::Failure)
    {
        StudentStatus::Failed
    } else {
        StudentStatus::InProgress
    }
}

/// Per-entry breakdown for one student.
pub fn entry_progress(student: &Student, course: &Course) -> Vec<EntryProgress> {
    let successes = success_set(&student.assignments);
    course
        .entries
        .iter()
        .map(|entry| {
            let satisfied_by = satisfying_id(entry, &successes).map(str::to_string);
            EntryProgress {
                label: entry.label(),
                kind: entry.kind().to_string(),
                complete: satisfied_by.is_some(),
                satisfied_by,
            }
        })
        .collect()
}

/// Position of an assignment in the course, for stable per-student ordering.
fn course_position(id: &str, course: &Course) -> (usize, usize) {
    course
        .entries
        .iter()
        .enumerate()
        .find_map(|(i, entry)| {
            entry
                .identifiers()
                .iter()
                .position(|candidate| *candidate == id)
                .map(|j| (i, j))
        })
        .unwrap_or((usize::MAX, usize::MAX))
}

/// Group results by username and reduce each group into a student record,
/// sorted by display name.
///
/// Every repository keeps its own result, so two repositories that fold onto
/// the same assignment both count towards the student's status.
pub fn build_students<I>(results: I, course: &Course) -> Vec<Student>
where
    I: IntoIterator<Item = (String, AssignmentResult)>,
{
    let mut grouped: BTreeMap<String, Vec<AssignmentResult>> = BTreeMap::new();
    for (username, result) in results {
        grouped.entry(username).or_default().push(result);
    }

    let total = course.total_entries();
    let mut students: Vec<Student> = grouped
        .into_iter()
        .map(|(username, mut assignments)| {
            assignments.sort_by(|a, b| {
                course_position(&a.assignment_name, course)
                    .cmp(&course_position(&b.assignment_name, course))
                    .then_with(|| a.assignment_name.cmp(&b.assignment_name))
                    .then_with(|| a.repo_name.cmp(&b.repo_name))
            });

            let completed = reduce_completion(&assignments, course);
            let last_active = assignments.iter().filter_map(|a| a.last_commit_date).max();
            let status = overall_status(completed, total, &assignments);

            Student {
                display_name: username.clone(),
                avatar_url: format!("https://github.com/{}.png", username),
                username,
                assignments,
                completed_count: completed,
                total_assignments: total,
                progress_percentage: progress_percentage(completed, total),
                last_active,
                status,
            }
        })
        .collect();

    sort_students(&mut students);
    students
}

/// Sort by display name, case-insensitively, then exactly.
pub fn sort_students(students: &mut [Student]) {
    students.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn course() -> Course {
        Course::cs50("org-")
    }

    fn result(name: &str, status: AssignmentStatus) -> AssignmentResult {
        AssignmentResult {
            assignment_name: name.to_string(),
            repo_name: format!("org-{}-alice", name),
            status,
            last_commit_date: None,
            last_commit_message: None,
            workflow_status: None,
        }
    }

    fn run(status: RunStatus, conclusion: Option<RunConclusion>) -> WorkflowRun {
        WorkflowRun {
            id: 1,
            name: Some("check50".to_string()),
            run_number: 1,
            status,
            conclusion,
            head_branch: Some("main".to_string()),
            head_sha: "abc".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            html_url: "https://github.com/org/repo/actions/runs/1".to_string(),
        }
    }

    fn commit() -> Commit {
        serde_json::from_value(serde_json::json!({
            "sha": "abc",
            "commit": {"message": "submit", "author": {"name": "a", "date": "2024-01-01T00:00:00Z"}}
        }))
        .unwrap()
    }

    #[test]
    fn longest_candidate_wins() {
        let course = Course::new("t", "org-")
            .with_entry(AssignmentEntry::required("mario"))
            .with_entry(AssignmentEntry::choice(["mario-less", "mario-more"]));
        assert_eq!(
            parse_assignment_name("org-mario-less-jdoe", &course).as_deref(),
            Some("mario-less")
        );
        assert_eq!(
            extract_username("org-mario-less-jdoe", &course).as_deref(),
            Some("jdoe")
        );
        assert_eq!(
            parse_assignment_name("org-mario-jdoe", &course).as_deref(),
            Some("mario")
        );
    }

    #[test]
    fn candidate_must_end_at_separator() {
        let course = Course::new("t", "org-").with_entry(AssignmentEntry::required("cash"));
        // "cashier" is not "cash" followed by a separator, so the fallback segment is used.
        assert_eq!(
            parse_assignment_name("org-cashier-bob", &course).as_deref(),
            Some("cashier")
        );
        assert!(resolve_repo("org-cashier-bob", &course).is_none());
    }

    #[test]
    fn equal_length_candidates_break_ties_lexicographically() {
        let course = Course::new("t", "")
            .with_entry(AssignmentEntry::required("ab-c"))
            .with_entry(AssignmentEntry::required("ab"))
            .with_entry(AssignmentEntry::required("a-bc"));
        assert_eq!(candidates(&course), vec!["a-bc", "ab-c", "ab"]);
    }

    #[test]
    fn short_names_do_not_resolve() {
        let course = course();
        assert_eq!(parse_assignment_name("org-hello", &course), None);
        assert_eq!(parse_assignment_name("hello", &Course::cs50("")), None);
        assert_eq!(extract_username("org-hello", &course), None);
        assert!(resolve_repo("org-hello", &course).is_none());

        // A bare multi-segment id parses but leaves no username.
        assert_eq!(
            parse_assignment_name("org-mario-less", &course).as_deref(),
            Some("mario-less")
        );
        assert_eq!(extract_username("org-mario-less", &course), None);
    }

    #[test]
    fn resolves_alternative_names_to_canonical() {
        let resolved = resolve_repo("org-dna-python-carol", &course()).unwrap();
        assert_eq!(resolved.assignment, "dna");
        assert_eq!(resolved.username, "carol");
    }

    #[test]
    fn usernames_may_contain_separators() {
        let resolved = resolve_repo("org-filter-more-mary-jane", &course()).unwrap();
        assert_eq!(resolved.assignment, "filter-more");
        assert_eq!(resolved.username, "mary-jane");
    }

    #[test]
    fn status_decision_table() {
        let c = commit();
        assert_eq!(determine_status(None, None), AssignmentStatus::NotStarted);
        assert_eq!(
            determine_status(Some(&run(RunStatus::Completed, Some(RunConclusion::Success))), None),
            AssignmentStatus::NotStarted
        );
        assert_eq!(determine_status(None, Some(&c)), AssignmentStatus::NoTests);
        assert_eq!(
            determine_status(Some(&run(RunStatus::Queued, None)), Some(&c)),
            AssignmentStatus::InProgress
        );
        assert_eq!(
            determine_status(Some(&run(RunStatus::InProgress, None)), Some(&c)),
            AssignmentStatus::InProgress
        );
        assert_eq!(
            determine_status(
                Some(&run(RunStatus::Completed, Some(RunConclusion::Success))),
                Some(&c)
            ),
            AssignmentStatus::Success
        );
        assert_eq!(
            determine_status(
                Some(&run(RunStatus::Completed, Some(RunConclusion::Cancelled))),
                Some(&c)
            ),
            AssignmentStatus::Failure
        );
    }

    #[test]
    fn choice_group_counts_once() {
        let course = course();
        let one = vec![result("mario-less", AssignmentStatus::Success)];
        let both = vec![
            result("mario-less", AssignmentStatus::Success),
            result("mario-more", AssignmentStatus::Success),
        ];
        assert_eq!(reduce_completion(&one, &course), 1);
        assert_eq!(reduce_completion(&both, &course), 1);
    }

    #[test]
    fn completion_never_exceeds_total_and_reaches_it_only_when_all_done() {
        let course = course();
        let mut everything: Vec<AssignmentResult> = course
            .entries
            .iter()
            .flat_map(|e| e.identifiers())
            .map(|id| result(id, AssignmentStatus::Success))
            .collect();
        assert_eq!(reduce_completion(&everything, &course), 14);

        // Only one option per group is needed.
        let minimal: Vec<AssignmentResult> = course
            .entries
            .iter()
            .map(|e| result(e.identifiers()[0], AssignmentStatus::Success))
            .collect();
        assert_eq!(reduce_completion(&minimal, &course), 14);

        everything.retain(|r| r.assignment_name != "speller");
        assert_eq!(reduce_completion(&everything, &course), 13);
    }

    #[test]
    fn failed_results_do_not_count() {
        let course = course();
        let results = vec![
            result("hello", AssignmentStatus::Failure),
            result("cash", AssignmentStatus::InProgress),
        ];
        assert_eq!(reduce_completion(&results, &course), 0);
        assert_eq!(overall_status(0, 14, &results), StudentStatus::Failed);
        assert_eq!(
            overall_status(0, 14, &results[1..]),
            StudentStatus::InProgress
        );
        assert_eq!(overall_status(14, 14, &results), StudentStatus::Passed);
    }

    #[test]
    fn percentage_rounds() {
        assert_eq!(progress_percentage(3, 14), 21);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(14, 14), 100);
    }

    #[test]
    fn build_students_groups_and_sorts() {
        let course = course();
        let mut older = result("hello", AssignmentStatus::Failure);
        older.last_commit_date = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut newer = result("cash", AssignmentStatus::Success);
        newer.last_commit_date = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());

        let students = build_students(
            vec![
                ("zed".to_string(), result("hello", AssignmentStatus::Success)),
                ("Bob".to_string(), newer.clone()),
                ("Bob".to_string(), older),
                ("amy".to_string(), result("hello", AssignmentStatus::NoTests)),
            ],
            &course,
        );

        let names: Vec<&str> = students.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["amy", "Bob", "zed"]);

        let bob = &students[1];
        assert_eq!(bob.assignments[0].assignment_name, "hello");
        assert_eq!(bob.assignments[1].assignment_name, "cash");
        assert_eq!(bob.completed_count, 1);
        assert_eq!(bob.status, StudentStatus::Failed);
        assert_eq!(bob.last_active, newer.last_commit_date);
        assert_eq!(bob.avatar_url, "https://github.com/Bob.png");
    }

    #[test]
    fn every_repository_keeps_its_result() {
        let course = course();
        let mut failed = result("dna", AssignmentStatus::Failure);
        failed.repo_name = "org-dna-alice".to_string();
        let mut passed = result("dna", AssignmentStatus::Success);
        passed.repo_name = "org-dna-python-alice".to_string();

        let students = build_students(
            vec![("alice".to_string(), passed), ("alice".to_string(), failed)],
            &course,
        );
        let alice = &students[0];
        let repos: Vec<&str> = alice.assignments.iter().map(|a| a.repo_name.as_str()).collect();
        assert_eq!(repos, vec!["org-dna-alice", "org-dna-python-alice"]);
        assert_eq!(alice.completed_count, 1);
        assert_eq!(alice.status, StudentStatus::Failed);
    }

    #[test]
    fn entry_progress_reports_satisfying_option() {
        let course = course();
        let students = build_students(
            vec![("eve".to_string(), result("credit", AssignmentStatus::Success))],
            &course,
        );
        let entries = entry_progress(&students[0], &course);
        assert_eq!(entries.len(), 14);
        assert!(!entries[0].complete);
        assert!(entries[2].complete);
        assert_eq!(entries[2].satisfied_by.as_deref(), Some("credit"));
        assert_eq!(entries[2].kind, "choice");
    }
}
