use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Declined,
}

/// The single forward step a provider may request on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStep {
    Start,
    Complete,
}

impl ProviderStep {
    pub fn target(self) -> JobStatus {
        match self {
            ProviderStep::Start => JobStatus::InProgress,
            ProviderStep::Complete => JobStatus::Completed,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProviderStep::Start => "Start Job",
            ProviderStep::Complete => "Mark Job as Complete",
        }
    }
}

pub const STEPPER_LABELS: [&str; 4] = ["Pending", "Accepted", "In Progress", "Completed"];

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Accepted | JobStatus::InProgress)
    }

    pub fn is_history(self) -> bool {
        !self.is_active()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Declined)
    }

    /// Derived from status alone; the server still decides.
    pub fn next_provider_step(self) -> Option<ProviderStep> {
        match self {
            JobStatus::Accepted => Some(ProviderStep::Start),
            JobStatus::InProgress => Some(ProviderStep::Complete),
            _ => None,
        }
    }

    pub fn customer_can_cancel(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Accepted)
    }

    /// Position on the happy-path stepper. Abnormal terminal states have none.
    pub fn stepper_index(self) -> Option<usize> {
        match self {
            JobStatus::Pending => Some(0),
            JobStatus::Accepted => Some(1),
            JobStatus::InProgress => Some(2),
            JobStatus::Completed => Some(3),
            JobStatus::Cancelled | JobStatus::Declined => None,
        }
    }

    pub fn as_api_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Accepted => "ACCEPTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Declined => "DECLINED",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Accepted => "Accepted",
            JobStatus::InProgress => "In Progress",
            JobStatus::Completed => "Completed",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Declined => "Declined",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
