use crate::types::enums::JobStatus;
use crate::types::file::ProjectFile;
use crate::types::ids::{OwnerId, ProjectId};
use crate::types::job::{BuildDirective, DependencyGraph};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateJobInput {
    pub owner_id: OwnerId,
    pub project_id: ProjectId,
    pub original_prompt: String,
    pub directive: BuildDirective,
    #[serde(default)]
    pub dependency_graph: DependencyGraph,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobFilter {
    pub owner_id: Option<OwnerId>,
    pub project_id: Option<ProjectId>,
    pub status: Option<Vec<JobStatus>>,
    /// `Some(true)` keeps only non-terminal jobs, `Some(false)` only terminal ones.
    pub active: Option<bool>,
}

impl JobFilter {
    pub fn for_owner(owner_id: &OwnerId) -> Self {
        Self {
            owner_id: Some(owner_id.clone()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PhaseReportInput {
    pub phase: u8,
    pub files: Vec<ProjectFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeInput {
    pub status: JobStatus,
    pub error: Option<String>,
}
