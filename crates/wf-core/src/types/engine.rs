use crate::types::enums::{BuildMode, NoticeLevel, ReviewStatus};
use crate::types::generation::PendingBuild;
use crate::types::ids::JobId;
use crate::types::job::PhaseProgress;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ephemeral, per-session view of the build in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BuildEngineState {
    pub is_thinking: bool,
    pub is_building: bool,
    pub build_directive: Option<PendingBuild>,
    pub review_status: Option<ReviewStatus>,
    pub fix_suggestion: Option<String>,
    pub active_job_id: Option<JobId>,
    pub mode: Option<BuildMode>,
    pub phase_progress: PhaseProgress,
    pub thinking_steps: Vec<String>,
    pub message: String,
}

impl BuildEngineState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clears build tracking but keeps the review state of the last build.
    pub fn finish_build(&mut self) {
        let review_status = self.review_status;
        let fix_suggestion = self.fix_suggestion.take();
        self.reset();
        self.review_status = review_status;
        self.fix_suggestion = fix_suggestion;
    }

    pub fn has_active_job(&self) -> bool {
        self.active_job_id.is_some() || self.is_building
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub job_id: Option<JobId>,
}
