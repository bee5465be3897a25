//! Read models merged from the job table and the generation tracker.
//!
//! These are what clients poll: one "something is happening" list that covers
//! both code generation and compilation, and a short history of finished
//! builds.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::build_job::{BuildJob, BuildJobStatus};
use crate::generation::{ActiveGeneration, GenerationPhase};
use crate::types::{JobId, Timestamp};

/// Default number of rows returned by [`recent_terminal_jobs`].
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Upper bound callers may request from the list views.
pub const MAX_LIST_LIMIT: usize = 200;

/// Clamp a caller-supplied limit into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIST_LIMIT)
}

// ---------------------------------------------------------------------------
// Active jobs
// ---------------------------------------------------------------------------

/// Where an active row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveSource {
    Build,
    Generation,
}

/// Status column of an active row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    Queued,
    Running,
    Generating,
}

/// A job-shaped row in the active view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveJobView {
    pub id: JobId,
    pub source: ActiveSource,
    pub status: ActiveStatus,
    pub project_id: String,
    pub project_name: String,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub runner_id: Option<String>,
    pub attempt: Option<u32>,
    pub max_attempts: Option<u32>,
    pub generation_phase: Option<GenerationPhase>,
    pub logs: Vec<String>,
}

impl ActiveJobView {
    fn from_job(job: &BuildJob) -> Self {
        let status = match job.status {
            BuildJobStatus::Running => ActiveStatus::Running,
            _ => ActiveStatus::Queued,
        };
        Self {
            id: job.id,
            source: ActiveSource::Build,
            status,
            project_id: job.request.project_id.clone(),
            project_name: job.request.project_name.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            runner_id: job.runner_id.clone(),
            attempt: Some(job.request.attempt),
            max_attempts: Some(job.request.max_attempts),
            generation_phase: None,
            logs: job.logs.iter().cloned().collect(),
        }
    }

    fn from_generation(generation: &ActiveGeneration) -> Self {
        Self {
            id: generation.id,
            source: ActiveSource::Generation,
            status: ActiveStatus::Generating,
            project_id: generation.project_id.clone(),
            project_name: generation.project_name.clone(),
            created_at: generation.started_at,
            started_at: Some(generation.started_at),
            runner_id: None,
            attempt: None,
            max_attempts: None,
            generation_phase: Some(generation.phase),
            logs: Vec::new(),
        }
    }
}

/// Queued and running jobs plus generations that have no active build yet,
/// newest first.
///
/// A generation linked to a job that is itself in the active set is left out
/// so one unit of work never shows up twice.
pub fn active_jobs(jobs: &[BuildJob], generations: &[ActiveGeneration]) -> Vec<ActiveJobView> {
    let mut rows: Vec<ActiveJobView> = jobs
        .iter()
        .filter(|j| !j.status.is_terminal())
        .map(ActiveJobView::from_job)
        .collect();

    let active_ids: HashSet<JobId> = rows.iter().map(|r| r.id).collect();

    rows.extend(
        generations
            .iter()
            .filter(|g| g.is_active())
            .filter(|g| !g.build_job_id.is_some_and(|id| active_ids.contains(&id)))
            .map(ActiveJobView::from_generation),
    );

    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

// ---------------------------------------------------------------------------
// Recent terminal jobs
// ---------------------------------------------------------------------------

/// Succeeded and failed jobs, most recently finished first, at most `limit`.
pub fn recent_terminal_jobs(jobs: &[BuildJob], limit: usize) -> Vec<BuildJob> {
    let mut done: Vec<&BuildJob> = jobs.iter().filter(|j| j.status.is_terminal()).collect();
    done.sort_by_key(|j| std::cmp::Reverse(j.finished_at.unwrap_or(j.created_at)));
    done.into_iter().take(limit).cloned().collect()
}

// ---------------------------------------------------------------------------
// Attempt chain
// ---------------------------------------------------------------------------

/// Every job in the retry chain that `id` belongs to, oldest attempt first.
///
/// Walks `parent_job_id` back to the root, then `next_job_id` forward. Returns
/// an empty list when `id` is unknown.
pub fn attempt_chain(jobs: &[BuildJob], id: JobId) -> Vec<BuildJob> {
    let by_id: HashMap<JobId, &BuildJob> = jobs.iter().map(|j| (j.id, j)).collect();
    let Some(mut root) = by_id.get(&id).copied() else {
        return Vec::new();
    };

    let mut seen = HashSet::from([root.id]);
    while let Some(parent) = root.request.parent_job_id.and_then(|p| by_id.get(&p).copied()) {
        if !seen.insert(parent.id) {
            break;
        }
        root = parent;
    }

    let mut chain = vec![root.clone()];
    let mut visited = HashSet::from([root.id]);
    let mut current = root;
    while let Some(next) = current.next_job_id.and_then(|n| by_id.get(&n).copied()) {
        if !visited.insert(next.id) {
            break;
        }
        chain.push(next.clone());
        current = next;
    }
    chain
}

// ---------------------------------------------------------------------------
// Compiler error statistics
// ---------------------------------------------------------------------------

/// How often a compiler error message was seen across failed builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFrequency {
    pub message: String,
    pub count: usize,
}

/// Most frequent compiler errors over all failed jobs, at most `limit`.
///
/// Messages are compared after trimming whitespace. Ties are broken
/// alphabetically so the output is stable.
pub fn compiler_error_frequency(jobs: &[BuildJob], limit: usize) -> Vec<ErrorFrequency> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for job in jobs.iter().filter(|j| j.status == BuildJobStatus::Failed) {
        for message in job.compiler_errors() {
            let message = message.trim();
            if !message.is_empty() {
                *counts.entry(message).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<ErrorFrequency> = counts
        .into_iter()
        .map(|(message, count)| ErrorFrequency {
            message: message.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    ranked.truncate(limit);
    ranked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
