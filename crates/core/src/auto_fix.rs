//! Auto-fix policy: when a failed build may be retried, and what the
//! correction request and the retry job look like.
//!
//! The async loop that talks to the code generator lives in the API crate;
//! everything here is deterministic.

use std::fmt;

use serde::Serialize;

use crate::build_job::{BuildJob, BuildJobStatus, BuildRequest};
use crate::types::{JobId, SourceFiles};

/// Instruction sent along with every correction request.
pub const FIX_INSTRUCTIONS: &str = "The project failed to compile. Fix ONLY the compiler errors \
listed below. Do not change the app's behavior, layout, or features, and do not rename types \
or files. Return the complete contents of every file you change.";

/// Why the loop stopped without producing a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GaveUpReason {
    MaxAttemptsReached,
    NoCompilerErrors,
    NoSourceFiles,
    GeneratorReturnedNoFiles,
    RetryAlreadyCreated,
    AlreadyInProgress,
}

impl GaveUpReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::MaxAttemptsReached => "max attempts reached",
            Self::NoCompilerErrors => "no compiler errors to fix",
            Self::NoSourceFiles => "no source files to fix",
            Self::GeneratorReturnedNoFiles => "generator returned no files",
            Self::RetryAlreadyCreated => "retry already created",
            Self::AlreadyInProgress => "auto-fix already in progress",
        }
    }
}

impl fmt::Display for GaveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A precondition that blocks auto-fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoFixBlocked {
    /// The job is not in the `failed` state; the caller asked for something
    /// that does not make sense.
    NotFailed(BuildJobStatus),
    /// A policy stop; reported to the caller as a normal "gave up" outcome.
    GaveUp(GaveUpReason),
}

/// Check the auto-fix preconditions in order: failed status, attempt budget,
/// compiler errors present, sources present.
pub fn check_preconditions(job: &BuildJob) -> Result<(), AutoFixBlocked> {
    if job.status != BuildJobStatus::Failed {
        return Err(AutoFixBlocked::NotFailed(job.status));
    }
    if next_attempt(job).is_none() {
        return Err(AutoFixBlocked::GaveUp(GaveUpReason::MaxAttemptsReached));
    }
    if job.compiler_errors().is_empty() {
        return Err(AutoFixBlocked::GaveUp(GaveUpReason::NoCompilerErrors));
    }
    if !job.request.has_sources() {
        return Err(AutoFixBlocked::GaveUp(GaveUpReason::NoSourceFiles));
    }
    Ok(())
}

/// The attempt number a retry of `job` would carry, or `None` when the
/// budget is spent (including a counter already at `u32::MAX`).
pub fn next_attempt(job: &BuildJob) -> Option<u32> {
    job.request
        .attempt
        .checked_add(1)
        .filter(|next| *next <= job.request.max_attempts)
}

/// What the code generator is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionRequest {
    pub failed_job_id: JobId,
    pub project_name: String,
    pub bundle_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub instructions: String,
    pub errors: Vec<String>,
    pub files: SourceFiles,
}

impl CorrectionRequest {
    /// The request as a single prompt: instructions, numbered errors, then
    /// every file fenced with its path.
    pub fn to_prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.instructions);
        prompt.push_str("\n\nCompiler errors:\n");
        for (i, error) in self.errors.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, error));
        }
        prompt.push_str("\nCurrent source files:\n");
        for (path, content) in &self.files {
            prompt.push_str(&format!("\n--- {path} ---\n```swift\n{content}\n```\n"));
        }
        prompt
    }
}

/// Package a failed job's errors and sources for the code generator.
/// `attempt` is the value from [`next_attempt`].
pub fn correction_request(job: &BuildJob, attempt: u32) -> CorrectionRequest {
    CorrectionRequest {
        failed_job_id: job.id,
        project_name: job.request.project_name.clone(),
        bundle_id: job.request.bundle_id.clone(),
        attempt,
        max_attempts: job.request.max_attempts,
        instructions: FIX_INSTRUCTIONS.to_string(),
        errors: job.compiler_errors().to_vec(),
        files: job.request.files.clone().unwrap_or_default(),
    }
}

/// Merge corrected files over the failed snapshot.
///
/// Generators often return only the files they touched; untouched files are
/// carried over so the retry compiles the whole project.
pub fn merge_sources(original: &SourceFiles, corrected: SourceFiles) -> SourceFiles {
    let mut merged = original.clone();
    merged.extend(corrected);
    merged
}

/// The request for the retry job spawned from `failed`.
pub fn retry_request(failed: &BuildJob, attempt: u32, files: SourceFiles) -> BuildRequest {
    BuildRequest {
        project_id: failed.request.project_id.clone(),
        project_name: failed.request.project_name.clone(),
        bundle_id: failed.request.bundle_id.clone(),
        files: Some(files),
        team_id: failed.request.team_id.clone(),
        auto_fix: true,
        attempt,
        max_attempts: failed.request.max_attempts,
        parent_job_id: Some(failed.id),
        output_type: failed.request.output_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_job::tests::request;
    use crate::build_job::StatusUpdate;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use uuid::Uuid;

    fn failed_job(attempt: u32, max_attempts: u32) -> BuildJob {
        let mut req = request();
        req.attempt = attempt;
        req.max_attempts = max_attempts;
        req.files = Some(SourceFiles::from([(
            "App.swift".to_string(),
            "struct A {}".to_string(),
        )]));
        let mut job = BuildJob::new(Uuid::new_v4(), req, Utc::now());
        job.claim("r", Utc::now()).unwrap();
        job.apply_update(StatusUpdate::finished(BuildJobStatus::Failed, Utc::now(), Some(65), None))
            .unwrap();
        job.compiler_errors = Some(vec!["error: cannot find 'Foo' in scope".into()]);
        job
    }

    #[test]
    fn eligible_job_passes() {
        assert_eq!(check_preconditions(&failed_job(1, 3)), Ok(()));
    }

    #[test]
    fn non_failed_job_is_rejected() {
        let mut job = failed_job(1, 3);
        job.status = BuildJobStatus::Running;
        assert_matches!(
            check_preconditions(&job),
            Err(AutoFixBlocked::NotFailed(BuildJobStatus::Running))
        );
    }

    #[test]
    fn last_attempt_gives_up_regardless_of_errors() {
        let job = failed_job(3, 3);
        assert_eq!(
            check_preconditions(&job),
            Err(AutoFixBlocked::GaveUp(GaveUpReason::MaxAttemptsReached))
        );
    }

    #[test]
    fn missing_errors_give_up() {
        let mut job = failed_job(1, 3);
        job.compiler_errors = Some(Vec::new());
        assert_eq!(
            check_preconditions(&job),
            Err(AutoFixBlocked::GaveUp(GaveUpReason::NoCompilerErrors))
        );
        job.compiler_errors = None;
        assert_eq!(
            check_preconditions(&job),
            Err(AutoFixBlocked::GaveUp(GaveUpReason::NoCompilerErrors))
        );
    }

    #[test]
    fn missing_sources_give_up() {
        let mut job = failed_job(1, 3);
        job.request.files = Some(SourceFiles::new());
        assert_eq!(
            check_preconditions(&job),
            Err(AutoFixBlocked::GaveUp(GaveUpReason::NoSourceFiles))
        );
    }

    #[test]
    fn attempt_check_precedes_error_check() {
        let mut job = failed_job(5, 5);
        job.compiler_errors = None;
        job.request.files = None;
        assert_eq!(
            check_preconditions(&job),
            Err(AutoFixBlocked::GaveUp(GaveUpReason::MaxAttemptsReached))
        );
    }

    #[test]
    fn saturated_attempt_counter_gives_up() {
        let job = failed_job(u32::MAX, u32::MAX);
        assert_eq!(next_attempt(&job), None);
        assert_eq!(
            check_preconditions(&job),
            Err(AutoFixBlocked::GaveUp(GaveUpReason::MaxAttemptsReached))
        );
    }

    #[test]
    fn next_attempt_stays_within_budget() {
        assert_eq!(next_attempt(&failed_job(1, 3)), Some(2));
        assert_eq!(next_attempt(&failed_job(2, 3)), Some(3));
        assert_eq!(next_attempt(&failed_job(3, 3)), None);
        assert_eq!(next_attempt(&failed_job(u32::MAX - 1, u32::MAX)), Some(u32::MAX));
    }

    #[test]
    fn prompt_lists_errors_and_files() {
        let job = failed_job(1, 3);
        let prompt = correction_request(&job, 2).to_prompt();
        assert!(prompt.starts_with(FIX_INSTRUCTIONS));
        assert!(prompt.contains("1. error: cannot find 'Foo' in scope"));
        assert!(prompt.contains("--- App.swift ---"));
    }

    #[test]
    fn retry_request_links_parent() {
        let job = failed_job(2, 4);
        let files = SourceFiles::from([("App.swift".to_string(), "fixed".to_string())]);
        let attempt = next_attempt(&job).unwrap();
        let retry = retry_request(&job, attempt, files.clone());
        assert_eq!(retry.attempt, 3);
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.parent_job_id, Some(job.id));
        assert_eq!(retry.files, Some(files));
        assert!(retry.auto_fix);
        assert_eq!(retry.bundle_id, job.request.bundle_id);
    }

    #[test]
    fn merge_keeps_untouched_files() {
        let original = SourceFiles::from([
            ("A.swift".to_string(), "a".to_string()),
            ("B.swift".to_string(), "b".to_string()),
        ]);
        let corrected = SourceFiles::from([("B.swift".to_string(), "b2".to_string())]);
        let merged = merge_sources(&original, corrected);
        assert_eq!(merged["A.swift"], "a");
        assert_eq!(merged["B.swift"], "b2");
    }

    #[test]
    fn reasons_render_as_messages() {
        assert_eq!(GaveUpReason::MaxAttemptsReached.to_string(), "max attempts reached");
        assert_eq!(
            serde_json::to_value(GaveUpReason::NoSourceFiles).unwrap(),
            "no_source_files"
        );
    }
}
