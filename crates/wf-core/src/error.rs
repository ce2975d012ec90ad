use crate::types::enums::JobStatus;
use crate::types::ids::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found")]
    NotFound,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("owner already has an active job: {job_id}")]
    ActiveJobExists { job_id: JobId },
    #[error("a build is already streaming")]
    BuildInProgress,
    #[error("phase {phase} conflicts with recorded files: {message}")]
    PhaseConflict { phase: u8, message: String },
    #[error("invalid dependency graph: {message}")]
    InvalidGraph { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("history is corrupt: {message}")]
    CorruptHistory { message: String },
    #[error("failed to persist history: {message}")]
    Persist { message: String },
    #[error("failed to load history: {message}")]
    Load { message: String },
}

/// Cause of a failed generation stream. Each cause has its own user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    Aborted,
    Authentication,
    RateLimited,
    Unavailable,
    Other,
}

impl GenerationErrorKind {
    /// Classifies an error code or message reported by the generation service.
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        let haystack = code.unwrap_or(message).to_ascii_lowercase();
        if haystack.contains("rate") || haystack.contains("429") || haystack.contains("quota") {
            Self::RateLimited
        } else if haystack.contains("auth") || haystack.contains("401") || haystack.contains("403") {
            Self::Authentication
        } else if haystack.contains("abort") || haystack.contains("cancel") {
            Self::Aborted
        } else if haystack.contains("unavailable") || haystack.contains("503") {
            Self::Unavailable
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation stream aborted: {message}")]
    Aborted { message: String },
    #[error("generation failed: {message}")]
    Failed {
        kind: GenerationErrorKind,
        message: String,
    },
    #[error("generation client unavailable: {message}")]
    Unavailable { message: String },
}

impl GenerationError {
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            Self::Aborted { .. } => GenerationErrorKind::Aborted,
            Self::Failed { kind, .. } => *kind,
            Self::Unavailable { .. } => GenerationErrorKind::Unavailable,
        }
    }

    pub fn from_event(code: Option<&str>, message: &str) -> Self {
        Self::Failed {
            kind: GenerationErrorKind::classify(code, message),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("reviewer unavailable: {message}")]
    Unavailable { message: String },
    #[error("reviewer timed out")]
    Timeout,
    #[error("invalid reviewer output: {message}")]
    InvalidOutput { message: String },
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("phase worker failed to start: {message}")]
    Spawn { message: String },
    #[error("phase worker not configured")]
    NotConfigured,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },
    #[error("invalid config: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("internal error: {message}")]
    Internal { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_code_over_message() {
        assert_eq!(
            GenerationErrorKind::classify(Some("rate_limited"), "auth expired"),
            GenerationErrorKind::RateLimited
        );
        assert_eq!(
            GenerationErrorKind::classify(None, "HTTP 401 Unauthorized"),
            GenerationErrorKind::Authentication
        );
        assert_eq!(
            GenerationErrorKind::classify(None, "stream aborted by peer"),
            GenerationErrorKind::Aborted
        );
        assert_eq!(
            GenerationErrorKind::classify(None, "model exploded"),
            GenerationErrorKind::Other
        );
    }
}
