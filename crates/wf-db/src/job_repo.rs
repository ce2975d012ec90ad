use crate::util::{DbError, decode_id, decode_json, encode_json, from_rfc3339, to_rfc3339};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use wf_core::error::JobError;
use wf_core::jobs::JobRepository;
use wf_core::types::{
    BuildJob, CreateJobInput, JobFilter, JobId, JobStatus, ProjectFile, QualityReport,
};

const JOB_COLUMNS: &str = "id, owner_id, project_id, original_prompt, directive_json, dependency_graph_json, status, phase_files_json, error, started_at, updated_at, completed_at, quality_score, quality_report_json";

pub struct JobRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> JobRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn require(&self, id: &JobId) -> Result<BuildJob, JobError> {
        self.get(id)?.ok_or(JobError::NotFound)
    }
}

fn storage(err: impl std::fmt::Display) -> JobError {
    JobError::Storage {
        message: err.to_string(),
    }
}

impl<'a> JobRepository for JobRepo<'a> {
    fn create(&self, input: CreateJobInput, status: JobStatus) -> Result<BuildJob, JobError> {
        let now = Utc::now();
        let job = BuildJob {
            id: JobId::generate(),
            owner_id: input.owner_id,
            project_id: input.project_id,
            original_prompt: input.original_prompt,
            directive: input.directive,
            dependency_graph: input.dependency_graph,
            status,
            phase_files: BTreeMap::new(),
            error: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            quality_score: None,
            quality_report: None,
        };

        let sql = format!(
            "INSERT INTO jobs ({JOB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        );
        self.conn
            .execute(
                &sql,
                rusqlite::params![
                    job.id.as_str(),
                    job.owner_id.as_str(),
                    job.project_id.as_str(),
                    job.original_prompt,
                    encode_json(&job.directive)?,
                    encode_json(&job.dependency_graph)?,
                    job.status.to_string(),
                    encode_json(&job.phase_files)?,
                    job.error,
                    to_rfc3339(&job.started_at),
                    to_rfc3339(&job.updated_at),
                    job.completed_at.map(|value| to_rfc3339(&value)),
                    job.quality_score,
                    Option::<String>::None,
                ],
            )
            .map_err(storage)?;
        Ok(job)
    }

    fn get(&self, id: &JobId) -> Result<Option<BuildJob>, JobError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let row = stmt
            .query_row([id.as_str()], |row| Ok(map_job_row(row)))
            .optional()
            .map_err(storage)?;
        match row {
            Some(job) => job.map(Some).map_err(JobError::from),
            None => Ok(None),
        }
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<BuildJob>, JobError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY started_at ASC, id ASC");
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let mut rows = stmt.query([]).map_err(storage)?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().map_err(storage)? {
            let job = map_job_row(row)?;
            if matches_filter(&job, filter) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<String>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<BuildJob, JobError> {
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?1, error = COALESCE(?2, error), completed_at = COALESCE(?3, completed_at), updated_at = ?4 WHERE id = ?5",
                rusqlite::params![
                    status.to_string(),
                    error,
                    completed_at.map(|value| to_rfc3339(&value)),
                    to_rfc3339(&Utc::now()),
                    id.as_str(),
                ],
            )
            .map_err(storage)?;
        if changed == 0 {
            return Err(JobError::NotFound);
        }
        self.require(id)
    }

    fn record_phase(
        &self,
        id: &JobId,
        phase: u8,
        files: Vec<ProjectFile>,
    ) -> Result<BuildJob, JobError> {
        let mut job = self.require(id)?;
        job.phase_files.insert(phase, files);
        self.conn
            .execute(
                "UPDATE jobs SET phase_files_json = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![
                    encode_json(&job.phase_files)?,
                    to_rfc3339(&Utc::now()),
                    id.as_str(),
                ],
            )
            .map_err(storage)?;
        self.require(id)
    }

    fn set_quality(
        &self,
        id: &JobId,
        score: Option<u8>,
        report: QualityReport,
    ) -> Result<BuildJob, JobError> {
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET quality_score = ?1, quality_report_json = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![
                    score,
                    encode_json(&report)?,
                    to_rfc3339(&Utc::now()),
                    id.as_str(),
                ],
            )
            .map_err(storage)?;
        if changed == 0 {
            return Err(JobError::NotFound);
        }
        self.require(id)
    }
}

fn matches_filter(job: &BuildJob, filter: &JobFilter) -> bool {
    if let Some(owner_id) = &filter.owner_id {
        if &job.owner_id != owner_id {
            return false;
        }
    }
    if let Some(project_id) = &filter.project_id {
        if &job.project_id != project_id {
            return false;
        }
    }
    if let Some(statuses) = &filter.status {
        if !statuses.contains(&job.status) {
            return false;
        }
    }
    if let Some(active) = filter.active {
        if job.status.is_terminal() == active {
            return false;
        }
    }
    true
}

fn map_job_row(row: &Row<'_>) -> Result<BuildJob, JobError> {
    let id: String = row.get(0).map_err(storage)?;
    let owner_id: String = row.get(1).map_err(storage)?;
    let project_id: String = row.get(2).map_err(storage)?;
    let original_prompt: String = row.get(3).map_err(storage)?;
    let directive_json: String = row.get(4).map_err(storage)?;
    let dependency_graph_json: String = row.get(5).map_err(storage)?;
    let status: String = row.get(6).map_err(storage)?;
    let phase_files_json: String = row.get(7).map_err(storage)?;
    let error: Option<String> = row.get(8).map_err(storage)?;
    let started_at: String = row.get(9).map_err(storage)?;
    let updated_at: String = row.get(10).map_err(storage)?;
    let completed_at: Option<String> = row.get(11).map_err(storage)?;
    let quality_score: Option<u8> = row.get(12).map_err(storage)?;
    let quality_report_json: Option<String> = row.get(13).map_err(storage)?;

    let status: JobStatus = status.parse().map_err(|_| DbError::InvalidColumn {
        column: "status",
        value: status.clone(),
    })?;

    Ok(BuildJob {
        id: decode_id("id", id)?,
        owner_id: decode_id("owner_id", owner_id)?,
        project_id: decode_id("project_id", project_id)?,
        original_prompt,
        directive: decode_json(&directive_json)?,
        dependency_graph: decode_json(&dependency_graph_json)?,
        status,
        phase_files: decode_json(&phase_files_json)?,
        error,
        started_at: from_rfc3339(&started_at)?,
        updated_at: from_rfc3339(&updated_at)?,
        completed_at: completed_at
            .as_deref()
            .map(from_rfc3339)
            .transpose()?,
        quality_score,
        quality_report: quality_report_json
            .as_deref()
            .map(decode_json)
            .transpose()?,
    })
}
