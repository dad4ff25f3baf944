// grade-manager command line.
// Wires configuration, the GitHub client, and the tiered cache together and dispatches subcommands.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use grade_manager::cache::{
    FileSnapshotSource, HttpSnapshotSource, LocalStore, Snapshot, SnapshotSource, TieredCache,
};
use grade_manager::classroom_csv;
use grade_manager::config::AppConfig;
use grade_manager::course::Course;
use grade_manager::error::{GradeError, Result};
use grade_manager::github::GitHubClient;
use grade_manager::logging::init_logging;
use grade_manager::quiz::{self, QuizResult};
use grade_manager::student::{Student, StudentDetails};
use grade_manager::sync::{LiveFetch, LiveFetcher, LiveSource, ProgressFn, SyncProgress};

#[derive(Parser)]
#[command(name = "grade-manager")]
#[command(about = "Course progress for GitHub Classroom assignments", long_about = None)]
struct Cli {
    /// Directory holding config/default.toml and config/local.toml
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,
    /// GitHub organization, overriding configuration
    #[arg(long, global = true, env = "GITHUB_ORG")]
    org: Option<String>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every student with their course progress
    Students {
        /// Skip the caches and fetch from GitHub
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one student's per-assignment breakdown
    Student {
        username: String,
        #[arg(long)]
        json: bool,
    },
    /// Show where the current data came from and its age
    CacheInfo,
    /// Remove all locally cached data
    ClearCache,
    /// Fetch live data and write a snapshot for other users to read
    Snapshot {
        #[arg(long)]
        out: PathBuf,
    },
    /// Read a GitHub Classroom grades export
    ImportCsv {
        file: PathBuf,
        /// Also write a summary spreadsheet
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Write a summary spreadsheet of current progress
    Export {
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        refresh: bool,
    },
    /// Show the account the token belongs to
    Whoami,
    /// Append a quiz result to a gist
    QuizSubmit {
        #[arg(long)]
        gist: String,
        #[arg(long, default_value = "quiz-results.json")]
        file: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        quiz: String,
        #[arg(long)]
        score: u32,
        #[arg(long)]
        total: u32,
    },
}

/// Live source used when no token is configured: cached tiers still answer,
/// anything that needs GitHub reports the missing token.
struct NoTokenSource;

#[async_trait]
impl LiveSource for NoTokenSource {
    async fn fetch_students(&self, _progress: &ProgressFn<'_>) -> Result<LiveFetch> {
        Err(GradeError::MissingToken)
    }
}

struct Context {
    config: AppConfig,
    organization: String,
    course: Arc<Course>,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let config = AppConfig::load_from_path(&cli.config_dir)?;
        let organization = cli
            .org
            .clone()
            .unwrap_or_else(|| config.github.organization.clone());
        let course = Arc::new(config.load_course()?);
        Ok(Self {
            config,
            organization,
            course,
        })
    }

    fn client(&self) -> Result<Arc<GitHubClient>> {
        let token = self.config.github_token()?;
        let client = match &self.config.github.api_base {
            Some(base) => GitHubClient::with_base_url(&token, base)?,
            None => GitHubClient::new(&token)?,
        };
        Ok(Arc::new(client))
    }

    fn require_organization(&self) -> Result<&str> {
        if self.organization.trim().is_empty() {
            return Err(GradeError::Other(
                "no organization configured (set github.organization or --org)".to_string(),
            ));
        }
        Ok(&self.organization)
    }

    fn fetcher(&self, client: Arc<GitHubClient>) -> LiveFetcher<GitHubClient> {
        LiveFetcher::new(client, Arc::clone(&self.course), self.organization.clone())
            .batch_size(self.config.sync.batch_size)
            .per_page(self.config.sync.per_page)
    }

    fn live_source(&self) -> Result<Arc<dyn LiveSource>> {
        match self.config.github_token() {
            Ok(_) => {
                self.require_organization()?;
                Ok(Arc::new(self.fetcher(self.client()?)))
            }
            Err(GradeError::MissingToken) => {
                debug!("no GitHub token, live fetch unavailable");
                Ok(Arc::new(NoTokenSource))
            }
            Err(err) => Err(err),
        }
    }

    fn snapshot_source(&self) -> Option<Arc<dyn SnapshotSource>> {
        if let Some(dir) = &self.config.snapshot.dir {
            return Some(Arc::new(FileSnapshotSource::new(dir.clone())));
        }
        self.config
            .snapshot
            .url
            .as_deref()
            .map(|url| Arc::new(HttpSnapshotSource::new(url)) as Arc<dyn SnapshotSource>)
    }

    fn store(&self) -> Result<LocalStore> {
        match &self.config.cache.dir {
            Some(dir) => Ok(LocalStore::new(dir.clone())),
            None => LocalStore::from_default_dir()
                .ok_or_else(|| GradeError::Other("could not determine cache directory".to_string())),
        }
    }

    fn cache(&self) -> Result<TieredCache> {
        let store = self.store()?;
        debug!(root = %store.root().display(), "local cache");
        let mut cache = TieredCache::new(store, self.live_source()?, Arc::clone(&self.course))
            .ttls(
                self.config.cache.local_ttl(),
                self.config.cache.snapshot_ttl(),
            )
            .progress(Arc::new(|progress: SyncProgress| {
                info!(
                    phase = progress.phase.display(),
                    current = progress.current,
                    total = progress.total,
                    "sync progress"
                );
            }));
        if let Some(snapshot) = self.snapshot_source() {
            cache = cache.with_snapshot(snapshot);
        }
        Ok(cache)
    }
}

fn print_students(students: &[Student]) {
    println!(
        "{:<24} {:>9} {:>5}  {:<12} {}",
        "STUDENT", "COMPLETED", "%", "STATUS", "LAST ACTIVE"
    );
    for student in students {
        println!(
            "{:<24} {:>4}/{:<4} {:>4}%  {:<12} {}",
            student.display_name,
            student.completed_count,
            student.total_assignments,
            student.progress_percentage,
            student.status,
            format_time(student.last_active),
        );
    }
}

fn print_details(details: &StudentDetails) {
    let student = &details.student;
    println!(
        "{} ({}/{} complete, {}%, {})",
        student.display_name,
        student.completed_count,
        student.total_assignments,
        student.progress_percentage,
        student.status
    );
    for entry in &details.entries {
        let mark = if entry.complete { "x" } else { " " };
        match &entry.satisfied_by {
            Some(id) if entry.kind == "choice" => println!("  [{}] {} ({})", mark, entry.label, id),
            _ => println!("  [{}] {}", mark, entry.label),
        }
    }
    if !student.assignments.is_empty() {
        println!();
        for result in &student.assignments {
            println!(
                "  {:<16} {:<12} {:<20} {}",
                result.assignment_name,
                result.status,
                format_time(result.last_commit_date),
                result.last_commit_message.as_deref().unwrap_or_default()
            );
        }
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Fetch students; on failure fall back to whatever the local store still holds.
async fn students_or_stale(cache: &TieredCache, refresh: bool) -> Result<Vec<Student>> {
    match cache.get_all_students(refresh).await {
        Ok(students) => Ok(students),
        Err(err) => match cache.peek_local() {
            Some((students, written_at)) => {
                warn!(error = %err, %written_at, "refresh failed, using stale local data");
                eprintln!(
                    "warning: {} (showing data cached at {})",
                    err,
                    format_time(Some(written_at))
                );
                Ok(students)
            }
            None => Err(err),
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(&cli)?;

    match cli.command {
        Commands::Students { refresh, json } => {
            let cache = ctx.cache()?;
            let students = students_or_stale(&cache, refresh).await?;
            if json {
                print_json(&students)?;
            } else {
                print_students(&students);
                let info = cache.get_cache_info();
                eprintln!("{} students from {}", students.len(), info.source);
            }
        }
        Commands::Student { username, json } => {
            let cache = ctx.cache()?;
            match cache.get_student_details(&username).await? {
                Some(details) if json => print_json(&details)?,
                Some(details) => print_details(&details),
                None => return Err(GradeError::NotFound(format!("student {}", username))),
            }
        }
        Commands::CacheInfo => {
            let info = ctx.cache()?.get_cache_info();
            match (info.timestamp, info.age) {
                (Some(timestamp), Some(age)) => println!(
                    "source: {}\nupdated: {}\nage: {}s",
                    info.source,
                    timestamp.to_rfc3339(),
                    age.as_secs()
                ),
                _ => println!("source: {}", info.source),
            }
        }
        Commands::ClearCache => {
            let removed = ctx.cache()?.clear_all_caches()?;
            println!("Removed {} cached entries.", removed);
        }
        Commands::Snapshot { out } => {
            let organization = ctx.require_organization()?.to_string();
            let fetcher = ctx.fetcher(ctx.client()?);
            let fetch = fetcher
                .fetch_students(&|progress: SyncProgress| {
                    debug!(current = progress.current, total = progress.total, "snapshot progress");
                })
                .await?;
            let snapshot = Snapshot::new(
                fetch.students,
                organization,
                fetch.repos_resolved,
                ctx.course.total_entries(),
                Utc::now(),
            );
            snapshot.write_to_dir(&out)?;
            println!(
                "Wrote snapshot of {} students to {}.",
                snapshot.metadata.total_students,
                out.display()
            );
        }
        Commands::ImportCsv { file, export } => {
            let rows = classroom_csv::read_grades_csv(BufReader::new(File::open(&file)?))?;
            let students = classroom_csv::students_from_grades(&rows, &ctx.course);
            info!(rows = rows.len(), students = students.len(), "imported grades export");
            match export {
                Some(out) => {
                    classroom_csv::write_summary_csv(File::create(&out)?, &students, &ctx.course)?;
                    println!("Wrote summary of {} students to {}.", students.len(), out.display());
                }
                None => print_students(&students),
            }
        }
        Commands::Export { out, refresh } => {
            let cache = ctx.cache()?;
            let students = students_or_stale(&cache, refresh).await?;
            classroom_csv::write_summary_csv(File::create(&out)?, &students, &ctx.course)?;
            println!("Wrote summary of {} students to {}.", students.len(), out.display());
        }
        Commands::Whoami => {
            let user = ctx.client()?.get_current_user().await?;
            match user.name {
                Some(name) => println!("{} ({})", user.login, name),
                None => println!("{}", user.login),
            }
        }
        Commands::QuizSubmit {
            gist,
            file,
            username,
            quiz: quiz_id,
            score,
            total,
        } => {
            let result = QuizResult {
                username,
                quiz_id,
                score,
                total,
                submitted_at: Utc::now(),
            };
            let client = ctx.client()?;
            let count = quiz::append_quiz_result(client.as_ref(), &gist, &file, &result).await?;
            println!("Recorded result; {} now holds {} results.", file, count);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
