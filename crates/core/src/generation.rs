//! Code generation that has not (yet) turned into a build job.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Progress of a code-generation request, advanced by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Starting,
    Generating,
    Saving,
    Validating,
    Done,
}

/// An in-flight generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveGeneration {
    pub id: JobId,
    pub project_id: String,
    pub project_name: String,
    pub started_at: Timestamp,
    pub phase: GenerationPhase,
    pub build_job_id: Option<JobId>,
}

impl ActiveGeneration {
    pub fn new(id: JobId, project_id: String, project_name: String, now: Timestamp) -> Self {
        Self {
            id,
            project_id,
            project_name,
            started_at: now,
            phase: GenerationPhase::Starting,
            build_job_id: None,
        }
    }

    /// Entries marked `done` no longer show up in active views.
    pub fn is_active(&self) -> bool {
        self.phase != GenerationPhase::Done
    }
}
