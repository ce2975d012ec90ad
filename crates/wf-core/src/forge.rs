use crate::config::ForgeConfig;
use crate::engine::EngineApi;
use crate::error::{ForgeError, JobError};
use crate::events::EventRepository;
use crate::generation::{GenerationClient, PhaseWorker};
use crate::jobs::JobRepository;
use crate::quality::{QualityApi, QualityReviewer};
use crate::reconciler::ReconcilerApi;
use crate::store::Store;
use crate::types::event::{Event, EventBody};
use crate::types::{
    BuildJob, CreateJobInput, JobFilter, JobId, JobStatus, PhaseReportInput, QualityReport,
    StatusChangeInput,
};
use crate::validation::{
    validate_dependency_graph, validate_job_status_transition, validate_phase_files,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use wf_events::bus::EventBus;
use wf_events::types::{EventRecord, EventSource};

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source: EventSource,
    pub correlation_id: Option<String>,
}

impl RequestContext {
    pub fn new(source: EventSource, correlation_id: Option<String>) -> Self {
        Self {
            source,
            correlation_id,
        }
    }
}

pub struct Forge<S: Store> {
    pub(crate) store: S,
    pub(crate) event_bus: EventBus,
    pub(crate) config: ForgeConfig,
    pub(crate) generator: Option<Arc<dyn GenerationClient>>,
    pub(crate) worker: Option<Arc<dyn PhaseWorker>>,
    pub(crate) reviewer: Option<Arc<dyn QualityReviewer>>,
}

impl<S: Store> Forge<S> {
    pub fn new(store: S, event_bus: EventBus) -> Self {
        Self {
            store,
            event_bus,
            config: ForgeConfig::default(),
            generator: None,
            worker: None,
            reviewer: None,
        }
    }

    pub fn with_config(mut self, config: ForgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationClient>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_worker(mut self, worker: Arc<dyn PhaseWorker>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn QualityReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn jobs(&self) -> JobsApi<'_, S> {
        JobsApi { core: self }
    }

    pub fn events(&self) -> EventsApi<'_, S> {
        EventsApi { core: self }
    }

    pub fn engine(&self) -> EngineApi<'_, S> {
        EngineApi { core: self }
    }

    pub fn reconciler(&self) -> ReconcilerApi<'_, S> {
        ReconcilerApi { core: self }
    }

    pub fn quality(&self) -> QualityApi<'_, S> {
        QualityApi { core: self }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub(crate) fn with_events<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T, ForgeError>
    where
        F: FnOnce(&S) -> Result<(T, Vec<EventBody>), ForgeError>,
    {
        let (value, records) = self.store.with_tx(|store| {
            let (value, bodies) = f(store)?;
            let mut records = Vec::new();
            for body in bodies {
                let record = build_event_record(ctx, body)?;
                let record = store.events().append(record)?;
                records.push(record);
            }
            Ok((value, records))
        })?;
        for record in records {
            debug!(seq = record.seq, topic = ?record.topic, "publishing event");
            let _ = self.event_bus.publish(record);
        }
        Ok(value)
    }
}

pub struct JobsApi<'a, S: Store> {
    core: &'a Forge<S>,
}

impl<'a, S: Store> JobsApi<'a, S> {
    /// Creates a durable job in `building_phase_1`. An owner may hold one active job.
    pub fn create(
        &self,
        ctx: &RequestContext,
        input: CreateJobInput,
    ) -> Result<BuildJob, ForgeError> {
        validate_dependency_graph(&input.dependency_graph)?;
        if input.original_prompt.trim().is_empty() {
            return Err(JobError::InvalidInput {
                message: "original prompt is empty".to_string(),
            }
            .into());
        }
        self.core.with_events(ctx, |store| {
            let filter = JobFilter {
                owner_id: Some(input.owner_id.clone()),
                active: Some(true),
                ..JobFilter::default()
            };
            if let Some(active) = store.jobs().list(&filter)?.into_iter().next() {
                return Err(JobError::ActiveJobExists { job_id: active.id }.into());
            }
            let job = store.jobs().create(input, JobStatus::Building(1))?;
            info!(job_id = %job.id, owner_id = %job.owner_id, "job created");
            Ok((job.clone(), vec![EventBody::JobCreated { job }]))
        })
    }

    pub fn get(&self, id: &JobId) -> Result<Option<BuildJob>, ForgeError> {
        self.core.store.jobs().get(id).map_err(ForgeError::from)
    }

    pub fn require(&self, id: &JobId) -> Result<BuildJob, ForgeError> {
        self.get(id)?.ok_or_else(|| JobError::NotFound.into())
    }

    pub fn list(&self, filter: &JobFilter) -> Result<Vec<BuildJob>, ForgeError> {
        self.core
            .store
            .jobs()
            .list(filter)
            .map_err(ForgeError::from)
    }

    /// Stores the files a phase produced. Re-reporting identical files is a no-op.
    pub fn record_phase(
        &self,
        ctx: &RequestContext,
        id: &JobId,
        input: PhaseReportInput,
    ) -> Result<BuildJob, ForgeError> {
        self.core.with_events(ctx, |store| {
            let job = store.jobs().get(id)?.ok_or(JobError::NotFound)?;
            if job.phase_files.get(&input.phase) == Some(&input.files) {
                return Ok((job, Vec::new()));
            }
            validate_phase_files(&job, input.phase, &input.files)?;
            let updated = store.jobs().record_phase(id, input.phase, input.files)?;
            debug!(job_id = %id, phase = input.phase, "phase recorded");
            Ok((
                updated.clone(),
                vec![EventBody::PhaseRecorded {
                    job: updated,
                    phase: input.phase,
                }],
            ))
        })
    }

    pub fn transition(
        &self,
        ctx: &RequestContext,
        id: &JobId,
        input: StatusChangeInput,
    ) -> Result<BuildJob, ForgeError> {
        self.core.with_events(ctx, |store| {
            let job = store.jobs().get(id)?.ok_or(JobError::NotFound)?;
            validate_job_status_transition(job.status, input.status)?;
            if job.status == input.status {
                return Ok((job, Vec::new()));
            }
            let completed_at = input.status.is_terminal().then(Utc::now);
            let updated = store
                .jobs()
                .set_status(id, input.status, input.error, completed_at)?;
            info!(job_id = %id, from = %job.status, to = %updated.status, "job status changed");
            Ok((
                updated.clone(),
                vec![EventBody::JobStatusChanged {
                    job: updated,
                    from: job.status,
                    to: input.status,
                }],
            ))
        })
    }

    /// Flags the job cancelled. Terminal jobs are returned unchanged.
    pub fn cancel(&self, ctx: &RequestContext, id: &JobId) -> Result<BuildJob, ForgeError> {
        self.core.with_events(ctx, |store| {
            let job = store.jobs().get(id)?.ok_or(JobError::NotFound)?;
            if job.status.is_terminal() {
                return Ok((job, Vec::new()));
            }
            let updated =
                store
                    .jobs()
                    .set_status(id, JobStatus::Cancelled, None, Some(Utc::now()))?;
            info!(job_id = %id, "job cancelled");
            Ok((updated.clone(), vec![EventBody::JobCancelled { job: updated }]))
        })
    }

    pub fn mark_timed_out(&self, ctx: &RequestContext, id: &JobId) -> Result<BuildJob, ForgeError> {
        self.core.with_events(ctx, |store| {
            let job = store.jobs().get(id)?.ok_or(JobError::NotFound)?;
            if job.status.is_terminal() {
                return Ok((job, Vec::new()));
            }
            let updated = store.jobs().set_status(
                id,
                JobStatus::FailedTimeout,
                Some(format!("no progress since {}", job.updated_at.to_rfc3339())),
                Some(Utc::now()),
            )?;
            info!(job_id = %id, "job timed out");
            Ok((updated.clone(), vec![EventBody::JobTimedOut { job: updated }]))
        })
    }

    pub fn set_quality(
        &self,
        ctx: &RequestContext,
        id: &JobId,
        score: Option<u8>,
        report: QualityReport,
    ) -> Result<BuildJob, ForgeError> {
        self.core.with_events(ctx, |store| {
            let updated = store.jobs().set_quality(id, score, report)?;
            Ok((
                updated.clone(),
                vec![EventBody::QualityRecorded { job: updated }],
            ))
        })
    }

    /// Times out every non-terminal job with no update for longer than the stale threshold.
    pub fn sweep_stale(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<BuildJob>, ForgeError> {
        let threshold = self.core.config.stale_after();
        let active = self.list(&JobFilter {
            active: Some(true),
            ..JobFilter::default()
        })?;
        let mut timed_out = Vec::new();
        for job in active {
            if job.is_stale(now, threshold) {
                timed_out.push(self.mark_timed_out(ctx, &job.id)?);
            }
        }
        Ok(timed_out)
    }
}

pub struct EventsApi<'a, S: Store> {
    core: &'a Forge<S>,
}

impl<'a, S: Store> EventsApi<'a, S> {
    pub fn list(&self, after: Option<i64>, limit: Option<u32>) -> Result<Vec<Event>, ForgeError> {
        let records = self.core.store.events().list(after, limit)?;
        records.into_iter().map(decode_event).collect()
    }

    pub fn for_job(
        &self,
        job_id: &JobId,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>, ForgeError> {
        let records = self
            .core
            .store
            .events()
            .list_topic(job_id.as_str(), after, limit)?;
        records.into_iter().map(decode_event).collect()
    }

    /// Appends an event that is not tied to a job mutation.
    pub fn record(&self, ctx: &RequestContext, body: EventBody) -> Result<(), ForgeError> {
        self.core.with_events(ctx, |_| Ok(((), vec![body])))
    }
}

fn build_event_record(ctx: &RequestContext, body: EventBody) -> Result<EventRecord, ForgeError> {
    let topic = body.topic();
    let value = serde_json::to_value(body).map_err(|err| ForgeError::Internal {
        message: err.to_string(),
    })?;
    Ok(EventRecord {
        id: String::new(),
        seq: 0,
        at: Utc::now(),
        topic,
        correlation_id: ctx.correlation_id.clone(),
        source: ctx.source,
        body: value,
    })
}

pub fn decode_event(record: EventRecord) -> Result<Event, ForgeError> {
    let body: EventBody =
        serde_json::from_value(record.body).map_err(|err| ForgeError::Internal {
            message: err.to_string(),
        })?;
    Ok(Event {
        id: record.id,
        seq: record.seq,
        at: record.at,
        topic: record.topic,
        correlation_id: record.correlation_id,
        source: record.source,
        body,
    })
}

/// Decodes the job carried by a realtime record, if it carries one.
pub fn job_from_record(record: &EventRecord) -> Option<BuildJob> {
    serde_json::from_value::<EventBody>(record.body.clone())
        .ok()
        .and_then(EventBody::into_job)
}
