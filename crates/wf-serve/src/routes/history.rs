use crate::routes::error::{invalid_input, map_error};
use crate::{AppState, open_history};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use wf_core::ForgeError;
use wf_core::types::{ProjectId, Snapshot};
use wf_core::VersionedFileStore;
use wf_db::SnapshotRepo;

#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotSummary {
    pub version: u32,
    pub at: DateTime<Utc>,
    pub message: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryView {
    pub current_index: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub snapshots: Vec<SnapshotSummary>,
}

impl HistoryView {
    fn from_store(vfs: &VersionedFileStore<SnapshotRepo>) -> Self {
        Self {
            current_index: vfs.history().current_index(),
            can_undo: vfs.can_undo(),
            can_redo: vfs.can_redo(),
            snapshots: vfs
                .snapshots()
                .iter()
                .map(|snapshot| SnapshotSummary {
                    version: snapshot.version,
                    at: snapshot.at,
                    message: snapshot.message.clone(),
                    paths: snapshot.paths().into_iter().map(ToString::to_string).collect(),
                })
                .collect(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/projects/{project_id}/history", get(get_history))
        .route("/projects/{project_id}/files", get(current_files))
        .route("/projects/{project_id}/undo", post(undo))
        .route("/projects/{project_id}/redo", post(redo))
        .with_state(state)
}

fn open(state: &AppState, project_id: &str) -> Result<VersionedFileStore<SnapshotRepo>, ForgeError> {
    let project_id = project_id.parse::<ProjectId>().map_err(invalid_input)?;
    open_history(state, project_id)
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/history",
    params(("project_id" = String, Path, description = "Project ID")),
    responses((status = 200, body = HistoryView))
)]
pub(crate) async fn get_history(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Response {
    match open(&state, &project_id) {
        Ok(vfs) => Json(HistoryView::from_store(&vfs)).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/files",
    params(("project_id" = String, Path, description = "Project ID")),
    responses((status = 200, body = Snapshot))
)]
pub(crate) async fn current_files(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Response {
    match open(&state, &project_id) {
        Ok(vfs) => Json(vfs.current().clone()).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

/// Steps back one version. At the first version this is a no-op returning the current snapshot.
#[utoipa::path(
    post,
    path = "/api/projects/{project_id}/undo",
    params(("project_id" = String, Path, description = "Project ID")),
    responses((status = 200, body = Snapshot))
)]
pub(crate) async fn undo(State(state): State<AppState>, Path(project_id): Path<String>) -> Response {
    let result = open(&state, &project_id).and_then(|mut vfs| {
        vfs.undo()?;
        Ok(vfs.current().clone())
    });
    match result {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/projects/{project_id}/redo",
    params(("project_id" = String, Path, description = "Project ID")),
    responses((status = 200, body = Snapshot))
)]
pub(crate) async fn redo(State(state): State<AppState>, Path(project_id): Path<String>) -> Response {
    let result = open(&state, &project_id).and_then(|mut vfs| {
        vfs.redo()?;
        Ok(vfs.current().clone())
    });
    match result {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}
