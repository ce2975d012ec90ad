use crate::error::JobError;
use crate::types::{
    BuildJob, CreateJobInput, JobFilter, JobId, JobStatus, ProjectFile, QualityReport,
};
use chrono::{DateTime, Utc};

pub trait JobRepository {
    fn create(&self, input: CreateJobInput, status: JobStatus) -> Result<BuildJob, JobError>;
    fn get(&self, id: &JobId) -> Result<Option<BuildJob>, JobError>;
    fn list(&self, filter: &JobFilter) -> Result<Vec<BuildJob>, JobError>;
    fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<String>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<BuildJob, JobError>;
    fn record_phase(
        &self,
        id: &JobId,
        phase: u8,
        files: Vec<ProjectFile>,
    ) -> Result<BuildJob, JobError>;
    fn set_quality(
        &self,
        id: &JobId,
        score: Option<u8>,
        report: QualityReport,
    ) -> Result<BuildJob, JobError>;
}
