use crate::types::enums::JobStatus;
use crate::types::ids::{JobId, ProjectId};
use crate::types::job::BuildJob;
use crate::types::review::GateOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use wf_events::types::EventSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub id: String,
    pub seq: i64,
    pub at: DateTime<Utc>,
    pub topic: Option<String>,
    pub correlation_id: Option<String>,
    pub source: EventSource,
    pub body: EventBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    JobCreated {
        job: BuildJob,
    },
    PhaseRecorded {
        job: BuildJob,
        phase: u8,
    },
    JobStatusChanged {
        job: BuildJob,
        from: JobStatus,
        to: JobStatus,
    },
    JobCancelled {
        job: BuildJob,
    },
    JobTimedOut {
        job: BuildJob,
    },
    QualityRecorded {
        job: BuildJob,
    },

    SnapshotCommitted {
        project_id: ProjectId,
        version: u32,
        message: String,
    },
    ReviewCompleted {
        job_id: Option<JobId>,
        outcome: GateOutcome,
    },
}

impl EventBody {
    /// Full job record carried by job-scoped events.
    pub fn job(&self) -> Option<&BuildJob> {
        match self {
            Self::JobCreated { job }
            | Self::PhaseRecorded { job, .. }
            | Self::JobStatusChanged { job, .. }
            | Self::JobCancelled { job }
            | Self::JobTimedOut { job }
            | Self::QualityRecorded { job } => Some(job),
            Self::SnapshotCommitted { .. } | Self::ReviewCompleted { .. } => None,
        }
    }

    pub fn into_job(self) -> Option<BuildJob> {
        match self {
            Self::JobCreated { job }
            | Self::PhaseRecorded { job, .. }
            | Self::JobStatusChanged { job, .. }
            | Self::JobCancelled { job }
            | Self::JobTimedOut { job }
            | Self::QualityRecorded { job } => Some(job),
            Self::SnapshotCommitted { .. } | Self::ReviewCompleted { .. } => None,
        }
    }

    /// Topic the record is published under.
    pub fn topic(&self) -> Option<String> {
        match self {
            Self::SnapshotCommitted { project_id, .. } => Some(project_id.to_string()),
            Self::ReviewCompleted { job_id, .. } => job_id.as_ref().map(ToString::to_string),
            _ => self.job().map(|job| job.id.to_string()),
        }
    }
}
