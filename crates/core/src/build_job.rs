//! Build job model and status state machine.
//!
//! A [`BuildJob`] is one compilation attempt over a fixed source snapshot.
//! Status changes go through [`BuildJobStatus::transition`], which is the
//! single authority on which moves are legal:
//!
//! ```text
//! queued -> running -> succeeded
//!                   \-> failed
//! ```

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, SourceFiles, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log lines retained per job. Older lines are dropped.
pub const MAX_LOG_LINES: usize = 1500;

/// Attempt number assigned to a request that does not specify one.
pub const DEFAULT_ATTEMPT: u32 = 1;

/// Attempt ceiling assigned to a request that does not specify one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildJobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// A status change that the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal build status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: BuildJobStatus,
    pub to: BuildJobStatus,
}

impl BuildJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// `succeeded` and `failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Parse a status reported by a runner.
    ///
    /// Runners may only report `running`, `succeeded` or `failed`; anything
    /// else (including `queued`) yields `None` and is ignored by ingestion.
    pub fn from_report(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// The legal-transition table.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    /// Move to `next`, or reject the move outright.
    pub fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for BuildJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Request snapshot
// ---------------------------------------------------------------------------

/// Kind of artifact the runner should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// A simulator/device app bundle.
    #[default]
    App,
    /// A signed installable package.
    Ipa,
}

fn default_attempt() -> u32 {
    DEFAULT_ATTEMPT
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Immutable description of what to build, captured at job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub project_id: String,
    pub project_name: String,
    pub bundle_id: String,
    #[serde(default)]
    pub files: Option<SourceFiles>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub auto_fix: bool,
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub parent_job_id: Option<JobId>,
    #[serde(default)]
    pub output_type: OutputType,
}

impl BuildRequest {
    /// True when the snapshot carries at least one file.
    pub fn has_sources(&self) -> bool {
        self.files.as_ref().is_some_and(|f| !f.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Partial status update
// ---------------------------------------------------------------------------

/// Fields a caller may merge into a job. `None` means "unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<BuildJobStatus>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub runner_id: Option<String>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn status(status: BuildJobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A terminal report finishing the job at `at`.
    pub fn finished(
        status: BuildJobStatus,
        at: Timestamp,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> Self {
        Self {
            status: Some(status),
            finished_at: Some(at),
            exit_code,
            error,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// BuildJob
// ---------------------------------------------------------------------------

/// One compilation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildJob {
    pub id: JobId,
    pub status: BuildJobStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub runner_id: Option<String>,
    pub request: BuildRequest,
    pub logs: VecDeque<String>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub compiler_errors: Option<Vec<String>>,
    pub next_job_id: Option<JobId>,
    pub auto_fix_in_progress: bool,
    /// Time of the most recent runner report, used to detect silent runners.
    pub last_report_at: Option<Timestamp>,
}

impl BuildJob {
    /// A freshly queued job.
    pub fn new(id: JobId, request: BuildRequest, now: Timestamp) -> Self {
        Self {
            id,
            status: BuildJobStatus::Queued,
            created_at: now,
            started_at: None,
            finished_at: None,
            runner_id: None,
            request,
            logs: VecDeque::new(),
            exit_code: None,
            error: None,
            compiler_errors: None,
            next_job_id: None,
            auto_fix_in_progress: false,
            last_report_at: None,
        }
    }

    /// Append log lines, skipping empty ones and trimming the oldest lines
    /// beyond [`MAX_LOG_LINES`]. Returns how many lines were appended.
    pub fn append_logs<I, S>(&mut self, lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut appended = 0;
        for line in lines {
            let line = line.into();
            if line.is_empty() {
                continue;
            }
            self.logs.push_back(line);
            appended += 1;
        }
        while self.logs.len() > MAX_LOG_LINES {
            self.logs.pop_front();
        }
        appended
    }

    /// Append a single line.
    pub fn log(&mut self, line: impl Into<String>) {
        self.append_logs(std::iter::once(line.into()));
    }

    /// Merge a partial update.
    ///
    /// A status equal to the current one is a no-op (duplicate reports are
    /// tolerated). A different status must pass [`BuildJobStatus::transition`];
    /// if it does not, the update is rejected as a unit: every field here
    /// belongs to the transition it rides on (claim binding or terminal
    /// outcome). Report data outside the update (logs, compiler errors) is
    /// applied by the caller regardless. Timestamps and the runner id are
    /// write-once; exit code and error are only recorded once the job is
    /// terminal.
    pub fn apply_update(&mut self, update: StatusUpdate) -> Result<(), TransitionError> {
        if let Some(next) = update.status {
            if next != self.status {
                self.status = self.status.transition(next)?;
            }
        }

        if self.started_at.is_none() {
            self.started_at = update.started_at;
        }
        if self.runner_id.is_none() {
            self.runner_id = update.runner_id;
        }
        if self.status.is_terminal() {
            if self.finished_at.is_none() {
                self.finished_at = update.finished_at;
            }
            if self.exit_code.is_none() {
                self.exit_code = update.exit_code;
            }
            if self.error.is_none() {
                self.error = update.error;
            }
        }
        Ok(())
    }

    /// Bind this job to `runner_id` and mark it running.
    pub fn claim(&mut self, runner_id: &str, now: Timestamp) -> Result<(), TransitionError> {
        self.apply_update(StatusUpdate {
            status: Some(BuildJobStatus::Running),
            started_at: Some(now),
            runner_id: Some(runner_id.to_string()),
            ..StatusUpdate::default()
        })
    }

    /// Compiler errors captured for this job, or an empty slice.
    pub fn compiler_errors(&self) -> &[String] {
        self.compiler_errors.as_deref().unwrap_or_default()
    }

    /// A failed job that already has a retry.
    pub fn is_superseded(&self) -> bool {
        self.next_job_id.is_some()
    }

    /// Last sign of life from the runner: its latest report, or the claim.
    pub fn last_activity(&self) -> Option<Timestamp> {
        self.last_report_at.or(self.started_at)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
