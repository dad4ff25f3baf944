// Live fetch (tier 3).
// Lists the organization's repositories, resolves them, and fans out commit and workflow-run lookups in batches.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::course::Course;
use crate::error::Result;
use crate::github::{Commit, GitHubClient, Repository, WorkflowRun};
use crate::resolver::{self, ResolvedRepo};
use crate::student::{AssignmentResult, Student};

/// Default number of repositories whose details are requested at once.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// The GitHub calls a live fetch needs.
#[async_trait]
pub trait ClassroomApi: Send + Sync {
    async fn list_org_repos(&self, org: &str, per_page: u32) -> Result<Vec<Repository>>;
    async fn latest_commit(&self, owner: &str, repo: &str) -> Result<Option<Commit>>;
    async fn latest_workflow_run(&self, owner: &str, repo: &str) -> Result<Option<WorkflowRun>>;
}

#[async_trait]
impl ClassroomApi for GitHubClient {
    async fn list_org_repos(&self, org: &str, per_page: u32) -> Result<Vec<Repository>> {
        self.get_all_org_repos(org, per_page).await
    }

    async fn latest_commit(&self, owner: &str, repo: &str) -> Result<Option<Commit>> {
        self.get_latest_commit(owner, repo).await
    }

    async fn latest_workflow_run(&self, owner: &str, repo: &str) -> Result<Option<WorkflowRun>> {
        self.get_latest_workflow_run(owner, repo).await
    }
}

/// Phase of a live fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    ListingRepos,
    FetchingDetails,
    Done,
}

impl SyncPhase {
    pub fn display(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::ListingRepos => "Listing repositories",
            SyncPhase::FetchingDetails => "Fetching commits and runs",
            SyncPhase::Done => "Done",
        }
    }
}

/// Progress of the current live fetch, for display only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Repositories processed so far.
    pub current: usize,
    /// Repositories to process.
    pub total: usize,
}

/// Progress callback.
pub type ProgressFn<'a> = dyn Fn(SyncProgress) + Send + Sync + 'a;

/// No-op progress callback.
pub fn no_progress(_: SyncProgress) {}

/// Outcome of a live fetch.
#[derive(Debug, Clone)]
pub struct LiveFetch {
    pub students: Vec<Student>,
    /// Repositories listed in the organization.
    pub repos_scanned: usize,
    /// Repositories that resolved to a student submission.
    pub repos_resolved: usize,
}

/// Anything that can produce the full student list from the source of truth.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn fetch_students(&self, progress: &ProgressFn<'_>) -> Result<LiveFetch>;
}

/// Live fetch against the GitHub API.
pub struct LiveFetcher<A: ClassroomApi> {
    api: Arc<A>,
    course: Arc<Course>,
    organization: String,
    batch_size: usize,
    per_page: u32,
}

impl<A: ClassroomApi> LiveFetcher<A> {
    pub fn new(api: Arc<A>, course: Arc<Course>, organization: impl Into<String>) -> Self {
        Self {
            api,
            course,
            organization: organization.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            per_page: 100,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Commit and run for one repository. Request failures degrade to "none".
    async fn fetch_result(&self, owner: &str, resolved: &ResolvedRepo) -> AssignmentResult {
        let repo = resolved.repo_name.as_str();
        let (commit, run) = tokio::join!(
            self.api.latest_commit(owner, repo),
            self.api.latest_workflow_run(owner, repo)
        );

        let commit = commit.unwrap_or_else(|err| {
            warn!(%owner, %repo, error = %err, "commit lookup failed, treating as no commit");
            None
        });
        let run = run.unwrap_or_else(|err| {
            warn!(%owner, %repo, error = %err, "workflow run lookup failed, treating as no run");
            None
        });

        AssignmentResult {
            assignment_name: resolved.assignment.clone(),
            repo_name: resolved.repo_name.clone(),
            status: resolver::determine_status(run.as_ref(), commit.as_ref()),
            last_commit_date: commit.as_ref().and_then(Commit::date),
            last_commit_message: commit.as_ref().map(|c| c.summary().to_string()),
            workflow_status: run.as_ref().map(|r| r.status_label().to_string()),
        }
    }
}

#[async_trait]
impl<A: ClassroomApi + 'static> LiveSource for LiveFetcher<A> {
    #[instrument(skip(self, progress), fields(org = %self.organization))]
    async fn fetch_students(&self, progress: &ProgressFn<'_>) -> Result<LiveFetch> {
        progress(SyncProgress {
            phase: SyncPhase::ListingRepos,
            current: 0,
            total: 0,
        });

        let repos = self
            .api
            .list_org_repos(&self.organization, self.per_page)
            .await?;
        let repos_scanned = repos.len();

        let resolved: Vec<(String, ResolvedRepo)> = repos
            .into_iter()
            .filter_map(|repo| match resolver::resolve_repo(&repo.name, &self.course) {
                Some(resolved) => Some((repo.owner.login, resolved)),
                None => {
                    debug!(repo = %repo.name, "skipping repository with no known assignment");
                    None
                }
            })
            .collect();

        let total = resolved.len();
        info!(repos_scanned, resolved = total, "resolved classroom repositories");

        let mut results = Vec::with_capacity(total);
        let mut current = 0;
        progress(SyncProgress {
            phase: SyncPhase::FetchingDetails,
            current,
            total,
        });

        for batch in resolved.chunks(self.batch_size) {
            let batch_results = join_all(
                batch
                    .iter()
                    .map(|(owner, repo)| self.fetch_result(owner, repo)),
            )
            .await;

            for ((_, repo), result) in batch.iter().zip(batch_results) {
                results.push((repo.username.clone(), result));
            }

            current += batch.len();
            progress(SyncProgress {
                phase: SyncPhase::FetchingDetails,
                current,
                total,
            });
        }

        let students = resolver::build_students(results, &self.course);
        progress(SyncProgress {
            phase: SyncPhase::Done,
            current,
            total,
        });
        info!(students = students.len(), "live fetch complete");

        Ok(LiveFetch {
            students,
            repos_scanned,
            repos_resolved: total,
        })
    }
}
