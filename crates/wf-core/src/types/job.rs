use crate::types::enums::{JobStatus, PHASE_COUNT};
use crate::types::file::ProjectFile;
use crate::types::ids::{JobId, OwnerId, ProjectId};
use crate::types::review::QualityReport;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Structured instruction handed to the generation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BuildDirective {
    pub prompt: String,
    pub summary: Option<String>,
    pub project_name: Option<String>,
}

impl BuildDirective {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            summary: None,
            project_name: None,
        }
    }

    pub fn label(&self) -> &str {
        self.summary
            .as_deref()
            .or(self.project_name.as_deref())
            .unwrap_or(&self.prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlannedFile {
    pub path: String,
    pub phase: u8,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DependencyGraph {
    #[serde(default)]
    pub files: Vec<PlannedFile>,
}

impl DependencyGraph {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn phase_of(&self, path: &str) -> Option<u8> {
        self.files
            .iter()
            .find(|file| file.path == path)
            .map(|file| file.phase)
    }

    pub fn paths_in_phase(&self, phase: u8) -> Vec<&str> {
        self.files
            .iter()
            .filter(|file| file.phase == phase)
            .map(|file| file.path.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BuildJob {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub project_id: ProjectId,
    pub original_prompt: String,
    pub directive: BuildDirective,
    pub dependency_graph: DependencyGraph,
    pub status: JobStatus,
    pub phase_files: BTreeMap<u8, Vec<ProjectFile>>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub quality_score: Option<u8>,
    pub quality_report: Option<QualityReport>,
}

impl BuildJob {
    pub fn current_phase(&self) -> Option<u8> {
        self.status.phase()
    }

    pub fn completed_phases(&self) -> Vec<u8> {
        self.phase_files
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(phase, _)| *phase)
            .collect()
    }

    /// True once every phase has contributed files. Informational only; the
    /// remote `completed` status decides completion.
    pub fn phases_complete(&self) -> bool {
        (1..=PHASE_COUNT).all(|phase| {
            self.phase_files
                .get(&phase)
                .is_some_and(|files| !files.is_empty())
        })
    }

    /// Files of all phases merged in phase order.
    pub fn files(&self) -> Vec<ProjectFile> {
        let mut merged: BTreeMap<&str, &ProjectFile> = BTreeMap::new();
        for files in self.phase_files.values() {
            for file in files {
                merged.insert(file.path.as_str(), file);
            }
        }
        merged.into_values().cloned().collect()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        !self.status.is_terminal() && now - self.updated_at > threshold
    }

    pub fn completed_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let finished = self.completed_at.unwrap_or(self.updated_at);
        now - finished <= window
    }
}

/// User-facing progress derived from the job record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PhaseProgress {
    pub current: Option<u8>,
    pub completed: Vec<u8>,
    pub total: u8,
    pub message: Option<String>,
}

impl PhaseProgress {
    pub fn from_job(job: &BuildJob) -> Self {
        let message = match job.status {
            JobStatus::Planning => Some("Planning build".to_string()),
            JobStatus::Building(phase) => {
                Some(format!("Building phase {phase} of {PHASE_COUNT}"))
            }
            _ => None,
        };
        Self {
            current: job.current_phase(),
            completed: job.completed_phases(),
            total: PHASE_COUNT,
            message,
        }
    }
}
