use crate::types::enums::ReviewVerdict;
use crate::types::file::ProjectFile;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReviewIssue {
    pub file: String,
    pub issue: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub directive: String,
    pub files: Vec<ProjectFile>,
}

/// What the automated reviewer reports for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReviewReport {
    pub status: ReviewVerdict,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    pub fix_directive: Option<String>,
    pub score: Option<u8>,
}

/// Final result of one quality-gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    Approved {
        summary: String,
    },
    NeedsFix {
        fix_directive: String,
        issues: Vec<ReviewIssue>,
    },
    Rejected {
        issues: Vec<ReviewIssue>,
    },
}

impl GateOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Review summary persisted on a durable job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QualityReport {
    pub outcome: GateOutcome,
    pub summary: String,
    pub fix_attempts: u32,
}
