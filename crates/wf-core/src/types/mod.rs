pub mod engine;
pub mod enums;
pub mod event;
pub mod file;
pub mod generation;
pub mod ids;
pub mod io;
pub mod job;
pub mod review;

pub use engine::{BuildEngineState, Notice};
pub use enums::{
    BuildMode, JobStatus, NoticeLevel, OperationKind, PHASE_COUNT, ReviewStatus, ReviewVerdict,
};
pub use event::{Event, EventBody};
pub use file::{Operation, ProjectFile, Snapshot};
pub use generation::{GenerateRequest, GenerationEvent, PendingBuild, PlanRequest};
pub use ids::{IdError, JobId, OwnerId, ProjectId};
pub use io::{CreateJobInput, JobFilter, PhaseReportInput, StatusChangeInput};
pub use job::{BuildDirective, BuildJob, DependencyGraph, PhaseProgress, PlannedFile};
pub use review::{GateOutcome, QualityReport, ReviewIssue, ReviewReport, ReviewRequest};
