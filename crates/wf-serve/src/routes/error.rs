use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;
use wf_core::error::{
    ConfigError, ForgeError, GenerationError, JobError, ReviewError, VfsError, WorkerError,
};

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    pub correlation_id: Option<String>,
}

pub fn map_error(
    err: &ForgeError,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code, message) = match err {
        ForgeError::Job(job) => map_job_error(job),
        ForgeError::Vfs(vfs) => map_vfs_error(vfs),
        ForgeError::Generation(generation) => map_generation_error(generation),
        ForgeError::Review(review) => map_review_error(review),
        ForgeError::Worker(worker) => map_worker_error(worker),
        ForgeError::Config(config) => map_config_error(config),
        ForgeError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            message.clone(),
        ),
    };

    (
        status,
        Json(ErrorEnvelope {
            code,
            message,
            correlation_id,
        }),
    )
}

/// Rejection for a path or query value that failed to parse.
pub fn invalid_input(message: impl ToString) -> ForgeError {
    ForgeError::Job(JobError::InvalidInput {
        message: message.to_string(),
    })
}

fn map_job_error(err: &JobError) -> (StatusCode, &'static str, String) {
    match err {
        JobError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        JobError::InvalidTransition { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_state",
            err.to_string(),
        ),
        JobError::ActiveJobExists { .. } | JobError::BuildInProgress => {
            (StatusCode::CONFLICT, "active_job_exists", err.to_string())
        }
        JobError::PhaseConflict { .. } => (StatusCode::CONFLICT, "conflict", err.to_string()),
        JobError::InvalidGraph { .. } | JobError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        JobError::Storage { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            err.to_string(),
        ),
    }
}

fn map_vfs_error(err: &VfsError) -> (StatusCode, &'static str, String) {
    match err {
        VfsError::CorruptHistory { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "corrupt_history",
            err.to_string(),
        ),
        VfsError::Persist { .. } | VfsError::Load { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            err.to_string(),
        ),
    }
}

fn map_generation_error(err: &GenerationError) -> (StatusCode, &'static str, String) {
    match err {
        GenerationError::Unavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "provider_unavailable",
            err.to_string(),
        ),
        GenerationError::Aborted { .. } | GenerationError::Failed { .. } => {
            (StatusCode::BAD_GATEWAY, "generation_failed", err.to_string())
        }
    }
}

fn map_review_error(err: &ReviewError) -> (StatusCode, &'static str, String) {
    match err {
        ReviewError::Unavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "provider_unavailable",
            err.to_string(),
        ),
        ReviewError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout", err.to_string()),
        ReviewError::InvalidOutput { .. } => {
            (StatusCode::BAD_GATEWAY, "invalid_output", err.to_string())
        }
    }
}

fn map_worker_error(err: &WorkerError) -> (StatusCode, &'static str, String) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "worker_unavailable",
        err.to_string(),
    )
}

fn map_config_error(err: &ConfigError) -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "config_error",
        err.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::types::JobId;

    #[test]
    fn active_job_is_a_conflict() {
        let err = ForgeError::Job(JobError::ActiveJobExists {
            job_id: JobId::generate(),
        });
        let (status, Json(envelope)) = map_error(&err, Some("corr_1".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(envelope.code, "active_job_exists");
        assert_eq!(envelope.correlation_id.as_deref(), Some("corr_1"));
    }

    #[test]
    fn invalid_graph_is_bad_request() {
        let err = ForgeError::Job(JobError::InvalidGraph {
            message: "cycle".to_string(),
        });
        let (status, _) = map_error(&err, None);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn reviewer_timeout_is_gateway_timeout() {
        let (status, Json(envelope)) = map_error(&ForgeError::Review(ReviewError::Timeout), None);
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(envelope.code, "timeout");
    }
}
