use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{invalid_input, map_error};
use crate::routes::events::EventsQuery;
use crate::{AppState, build_forge};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use wf_core::RequestContext;
use wf_core::types::{
    BuildJob, CreateJobInput, Event, JobFilter, JobId, JobStatus, OwnerId, PhaseReportInput,
    ProjectId, StatusChangeInput,
};
use wf_events::types::EventSource;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, serde::Deserialize, ToSchema, IntoParams)]
pub struct JobListQuery {
    owner_id: Option<OwnerId>,
    project_id: Option<ProjectId>,
    status: Option<JobStatus>,
    active: Option<bool>,
}

impl From<JobListQuery> for JobFilter {
    fn from(query: JobListQuery) -> Self {
        Self {
            owner_id: query.owner_id,
            project_id: query.project_id,
            status: query.status.map(|status| vec![status]),
            active: query.active,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/sweep", post(sweep_stale))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/phases", post(record_phase))
        .route("/jobs/{id}/status", post(set_status))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/jobs/{id}/timeout", post(time_out_job))
        .route("/jobs/{id}/events", get(job_events))
        .route("/jobs/{id}/stream", get(job_stream))
        .with_state(state)
}

fn parse_job_id(id: &str) -> Result<JobId, wf_core::ForgeError> {
    id.parse::<JobId>().map_err(invalid_input)
}

#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = CreateJobInput,
    responses((status = 200, body = BuildJob))
)]
pub(crate) async fn create_job(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<CreateJobInput>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Ui, Some(correlation.0));
    match forge.jobs().create(&ctx, input) {
        Ok(job) => Json(job).into_response(),
        Err(err) => map_error(&err, ctx.correlation_id).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/jobs",
    params(JobListQuery),
    responses((status = 200, body = Vec<BuildJob>))
)]
pub(crate) async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, None).into_response(),
    };
    match forge.jobs().list(&query.into()) {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses((status = 200, body = BuildJob))
)]
pub(crate) async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let result = parse_job_id(&id).and_then(|job_id| forge.jobs().require(&job_id));
    match result {
        Ok(job) => Json(job).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/phases",
    params(("id" = String, Path, description = "Job ID")),
    request_body = PhaseReportInput,
    responses((status = 200, body = BuildJob))
)]
pub(crate) async fn record_phase(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(input): Json<PhaseReportInput>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Worker, Some(correlation.0));
    let result =
        parse_job_id(&id).and_then(|job_id| forge.jobs().record_phase(&ctx, &job_id, input));
    match result {
        Ok(job) => Json(job).into_response(),
        Err(err) => map_error(&err, ctx.correlation_id).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/status",
    params(("id" = String, Path, description = "Job ID")),
    request_body = StatusChangeInput,
    responses((status = 200, body = BuildJob))
)]
pub(crate) async fn set_status(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(input): Json<StatusChangeInput>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Worker, Some(correlation.0));
    let result =
        parse_job_id(&id).and_then(|job_id| forge.jobs().transition(&ctx, &job_id, input));
    match result {
        Ok(job) => Json(job).into_response(),
        Err(err) => map_error(&err, ctx.correlation_id).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/cancel",
    params(("id" = String, Path, description = "Job ID")),
    responses((status = 200, body = BuildJob))
)]
pub(crate) async fn cancel_job(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Ui, Some(correlation.0));
    match parse_job_id(&id).and_then(|job_id| forge.jobs().cancel(&ctx, &job_id)) {
        Ok(job) => Json(job).into_response(),
        Err(err) => map_error(&err, ctx.correlation_id).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/timeout",
    params(("id" = String, Path, description = "Job ID")),
    responses((status = 200, body = BuildJob))
)]
pub(crate) async fn time_out_job(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Reconciler, Some(correlation.0));
    match parse_job_id(&id).and_then(|job_id| forge.jobs().mark_timed_out(&ctx, &job_id)) {
        Ok(job) => Json(job).into_response(),
        Err(err) => map_error(&err, ctx.correlation_id).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/jobs/sweep",
    responses((status = 200, body = Vec<BuildJob>))
)]
pub(crate) async fn sweep_stale(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Reconciler, Some(correlation.0));
    match forge.jobs().sweep_stale(&ctx, Utc::now()) {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => map_error(&err, ctx.correlation_id).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}/events",
    params(("id" = String, Path, description = "Job ID"), EventsQuery),
    responses((status = 200, body = Vec<Event>))
)]
pub(crate) async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let result = parse_job_id(&id)
        .and_then(|job_id| forge.events().for_job(&job_id, query.after, query.limit));
    match result {
        Ok(events) => Json(events).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

/// Realtime channel for one job: replays its stored events after `after`, then streams live.
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/stream",
    params(("id" = String, Path, description = "Job ID"), EventsQuery),
    responses((status = 200, description = "text/event-stream of job events"))
)]
pub(crate) async fn job_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response {
    match parse_job_id(&id) {
        Ok(job_id) => crate::sse::subscribe(state, query.after, Some(job_id.to_string())).await,
        Err(err) => map_error(&err, None).into_response(),
    }
}
