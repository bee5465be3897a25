//! Runner status reports and how they are folded into a job.

use serde::Deserialize;

use crate::build_job::{BuildJob, BuildJobStatus, StatusUpdate, TransitionError};
use crate::types::Timestamp;

/// An update sent by a runner for one job. Every field is optional so runners
/// can stream logs on their own and report status separately.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerReport {
    /// Identity of the reporting runner. When present it must match the
    /// runner that claimed the job for the status field to be applied.
    #[serde(default)]
    pub runner_id: Option<String>,
    /// New log lines. Non-string entries are dropped.
    #[serde(default)]
    pub logs: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub compiler_errors: Option<Vec<String>>,
}

impl RunnerReport {
    /// The string entries of `logs`.
    pub fn log_lines(&self) -> Vec<String> {
        self.logs
            .iter()
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

/// Why the status field of a report was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusIgnored {
    #[error("unknown status '{0}'")]
    Unknown(String),
    #[error("job has not been claimed by a runner")]
    NotClaimed,
    #[error("job is owned by runner '{owner}', not '{reporter}'")]
    WrongRunner { owner: String, reporter: String },
    #[error(transparent)]
    Illegal(#[from] TransitionError),
}

/// What a report changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEffect {
    pub previous: BuildJobStatus,
    pub current: BuildJobStatus,
    pub logs_appended: usize,
    pub compiler_errors_recorded: bool,
    pub status_ignored: Option<StatusIgnored>,
}

impl ReportEffect {
    /// The new status if the report moved the job.
    pub fn transitioned_to(&self) -> Option<BuildJobStatus> {
        (self.previous != self.current).then_some(self.current)
    }
}

impl BuildJob {
    /// Fold a runner report into this job at time `now`.
    ///
    /// Logs and compiler errors are always applied. The status field is
    /// applied only when it names a runner-reportable status, the job has been
    /// claimed (by this runner, if the report names one), and the transition
    /// is legal; otherwise it is dropped and the reason returned in the effect.
    pub fn apply_report(&mut self, report: &RunnerReport, now: Timestamp) -> ReportEffect {
        let previous = self.status;
        self.last_report_at = Some(now);

        let logs_appended = self.append_logs(report.log_lines());

        let compiler_errors_recorded = match &report.compiler_errors {
            Some(errors) => {
                self.compiler_errors = Some(errors.clone());
                true
            }
            None => false,
        };

        let status_ignored = report
            .status
            .as_deref()
            .and_then(|status| self.apply_reported_status(status, report, now).err());

        ReportEffect {
            previous,
            current: self.status,
            logs_appended,
            compiler_errors_recorded,
            status_ignored,
        }
    }

    fn apply_reported_status(
        &mut self,
        status: &str,
        report: &RunnerReport,
        now: Timestamp,
    ) -> Result<(), StatusIgnored> {
        let next = BuildJobStatus::from_report(status)
            .ok_or_else(|| StatusIgnored::Unknown(status.to_string()))?;

        let owner = self.runner_id.as_deref().ok_or(StatusIgnored::NotClaimed)?;
        if let Some(reporter) = report.runner_id.as_deref() {
            if reporter != owner {
                return Err(StatusIgnored::WrongRunner {
                    owner: owner.to_string(),
                    reporter: reporter.to_string(),
                });
            }
        }

        let update = if next.is_terminal() {
            StatusUpdate::finished(next, now, report.exit_code, report.error.clone())
        } else {
            StatusUpdate::status(next)
        };
        self.apply_update(update)?;
        Ok(())
    }
}
