use utoipa::OpenApi;

use crate::routes::events::EventsQuery;
use crate::routes::history::{HistoryView, SnapshotSummary};
use crate::routes::jobs::JobListQuery;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use wf_core::types::{
    BuildDirective, BuildJob, BuildMode, CreateJobInput, DependencyGraph, Event, EventBody,
    GateOutcome, JobId, JobStatus, NoticeLevel, OperationKind, OwnerId, PhaseProgress,
    PhaseReportInput, PlannedFile, ProjectFile, ProjectId, QualityReport, ReviewIssue,
    ReviewStatus, ReviewVerdict, Snapshot, StatusChangeInput,
};
use wf_events::types::{EventRecord, EventSource};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::jobs::create_job,
        crate::routes::jobs::list_jobs,
        crate::routes::jobs::get_job,
        crate::routes::jobs::record_phase,
        crate::routes::jobs::set_status,
        crate::routes::jobs::cancel_job,
        crate::routes::jobs::time_out_job,
        crate::routes::jobs::sweep_stale,
        crate::routes::jobs::job_events,
        crate::routes::jobs::job_stream,
        crate::routes::history::get_history,
        crate::routes::history::current_files,
        crate::routes::history::undo,
        crate::routes::history::redo,
        crate::routes::events::list_events,
        crate::routes::events::subscribe
    ),
    components(schemas(
        BuildJob,
        PhaseProgress,
        CreateJobInput,
        PhaseReportInput,
        StatusChangeInput,
        JobListQuery,
        DependencyGraph,
        PlannedFile,
        BuildDirective,
        ProjectFile,
        Snapshot,
        HistoryView,
        SnapshotSummary,
        QualityReport,
        GateOutcome,
        ReviewIssue,
        Event,
        EventBody,
        EventRecord,
        EventsQuery,
        JobId,
        OwnerId,
        ProjectId,
        JobStatus,
        BuildMode,
        OperationKind,
        ReviewStatus,
        ReviewVerdict,
        NoticeLevel,
        EventSource
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn ensure_initialized() {
    let _ = ApiDoc::openapi();
}

pub fn router() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    let html = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>webforge API Docs</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
  </head>
  <body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
      window.ui = SwaggerUIBundle({ url: '/api/openapi.json', dom_id: '#swagger-ui' });
    </script>
  </body>
</html>
"#;
    (axum::http::StatusCode::OK, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_job_and_history_paths() {
        let json = generate_spec();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let paths = value["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/jobs"));
        assert!(paths.contains_key("/api/jobs/{id}/phases"));
        assert!(paths.contains_key("/api/projects/{project_id}/undo"));
        assert!(value["components"]["schemas"]["BuildJob"].is_object());
    }
}
