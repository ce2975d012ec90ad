pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod sse;
pub mod stale_sweep;

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use wf_core::error::ForgeError;
use wf_core::types::ProjectId;
use wf_core::{Forge, ForgeConfig, VersionedFileStore};
use wf_db::schema;
use wf_db::store::DbStore;
use wf_db::SnapshotRepo;
use wf_events::bus::EventBus;

#[derive(Clone)]
pub struct AppState {
    pub db_path: String,
    pub event_bus: EventBus,
    pub config: Arc<ForgeConfig>,
}

impl AppState {
    pub fn new(config: ForgeConfig, event_bus: EventBus) -> Self {
        Self {
            db_path: config.db_path_string(),
            event_bus,
            config: Arc::new(config),
        }
    }
}

pub fn build_forge(state: &AppState) -> Result<Forge<DbStore>, ForgeError> {
    let conn = schema::open_and_migrate(&state.db_path).map_err(|err| ForgeError::Internal {
        message: err.to_string(),
    })?;
    let store = DbStore::new(conn);
    Ok(Forge::new(store, state.event_bus.clone()).with_config(state.config.as_ref().clone()))
}

pub fn open_history(
    state: &AppState,
    project_id: ProjectId,
) -> Result<VersionedFileStore<SnapshotRepo>, ForgeError> {
    let repo = SnapshotRepo::open(&state.db_path, project_id)?;
    Ok(VersionedFileStore::open(repo)?)
}

pub fn app(state: AppState) -> Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}

/// Serves the HTTP API and runs the stale-job sweep until the listener fails.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, db_path = %state.db_path, "listening");
    tokio::spawn(stale_sweep::run(state.clone()));
    axum::serve(listener, app(state)).await
}
