//! Collaborators backed by external commands, configured under `[generator]`, `[reviewer]`
//! and `[worker]`.

use crate::config::{CommandSpec, ForgeConfig};
use crate::error::{ConfigError, GenerationError, ReviewError, WorkerError};
use crate::forge::Forge;
use crate::generation::{GenerationClient, GenerationStream, PhaseWorker};
use crate::quality::QualityReviewer;
use crate::store::Store;
use crate::types::{
    BuildJob, GenerateRequest, GenerationEvent, PlanRequest, ReviewReport, ReviewRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const OUTPUT_LIMIT: usize = 64 * 1024;
const DEFAULT_REVIEW_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum GeneratorRequest<'a> {
    Plan(&'a PlanRequest),
    Generate(&'a GenerateRequest),
}

fn command_for(argv: &[String]) -> Command {
    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    command
}

/// Writes the request as JSON to stdin and reads one `GenerationEvent` per stdout line.
pub struct CommandGenerationClient {
    argv: Vec<String>,
}

impl CommandGenerationClient {
    pub fn new(spec: &CommandSpec) -> Result<Self, ConfigError> {
        Ok(Self { argv: spec.argv()? })
    }

    fn spawn(&self, request: &GeneratorRequest<'_>) -> Result<GenerationStream, GenerationError> {
        let payload = serde_json::to_vec(request).map_err(|err| GenerationError::Unavailable {
            message: err.to_string(),
        })?;
        let mut child = command_for(&self.argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| GenerationError::Unavailable {
                message: err.to_string(),
            })?;
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(GenerationError::Unavailable {
                message: "generator pipes unavailable".to_string(),
            });
        };

        let (tx, rx) = mpsc::channel(64);
        let producer = tokio::spawn(async move {
            if let Err(err) = stdin.write_all(&payload).await {
                let _ = tx
                    .send(GenerationEvent::Error {
                        message: err.to_string(),
                        code: Some("unavailable".to_string()),
                    })
                    .await;
                return;
            }
            drop(stdin);

            let mut lines = BufReader::new(stdout).lines();
            loop {
                let event = match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<GenerationEvent>(&line) {
                        Ok(event) => event,
                        Err(err) => GenerationEvent::Error {
                            message: format!("invalid generator output: {err}"),
                            code: None,
                        },
                    },
                    Ok(None) => break,
                    Err(err) => GenerationEvent::Error {
                        message: err.to_string(),
                        code: None,
                    },
                };
                let last = matches!(event, GenerationEvent::Done | GenerationEvent::Error { .. });
                if tx.send(event).await.is_err() || last {
                    break;
                }
            }
            match child.wait().await {
                Ok(status) if !status.success() => warn!(%status, "generator exited with failure"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "failed to wait for generator"),
            }
        });
        Ok(GenerationStream::with_producer(rx, producer.abort_handle()))
    }
}

#[async_trait]
impl GenerationClient for CommandGenerationClient {
    async fn plan(&self, request: PlanRequest) -> Result<GenerationStream, GenerationError> {
        self.spawn(&GeneratorRequest::Plan(&request))
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationStream, GenerationError> {
        self.spawn(&GeneratorRequest::Generate(&request))
    }
}

/// Writes a `ReviewRequest` as JSON to stdin and parses a `ReviewReport` from stdout.
pub struct CommandReviewer {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandReviewer {
    pub fn new(spec: &CommandSpec) -> Result<Self, ConfigError> {
        Ok(Self {
            argv: spec.argv()?,
            timeout: spec.timeout().unwrap_or(DEFAULT_REVIEW_TIMEOUT),
        })
    }
}

#[async_trait]
impl QualityReviewer for CommandReviewer {
    async fn review(&self, request: ReviewRequest) -> Result<ReviewReport, ReviewError> {
        let payload = serde_json::to_vec(&request).map_err(|err| ReviewError::InvalidOutput {
            message: err.to_string(),
        })?;
        let mut child = command_for(&self.argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ReviewError::Unavailable {
                message: err.to_string(),
            })?;
        // Writing stdin and collecting output share one deadline; a reviewer that never
        // drains stdin cannot stall past the timeout.
        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&payload).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("reviewer closed stdin before reading the request");
                    }
                    Err(err) => return Err(err),
                }
            }
            child.wait_with_output().await
        };
        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ReviewError::Timeout)?
            .map_err(|err| ReviewError::Unavailable {
                message: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(ReviewError::Unavailable {
                message: limit_output(&output.stderr),
            });
        }
        serde_json::from_slice(&output.stdout).map_err(|err| ReviewError::InvalidOutput {
            message: err.to_string(),
        })
    }
}

/// Starts the phase worker as a detached process for one job.
pub struct CommandPhaseWorker {
    argv: Vec<String>,
    db_path: String,
}

impl CommandPhaseWorker {
    pub fn new(spec: &CommandSpec, db_path: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            argv: spec.argv()?,
            db_path: db_path.into(),
        })
    }
}

#[async_trait]
impl PhaseWorker for CommandPhaseWorker {
    async fn trigger(&self, job: &BuildJob) -> Result<(), WorkerError> {
        let child = command_for(&self.argv)
            .env("WEBFORGE_JOB_ID", job.id.as_str())
            .env("WEBFORGE_PROJECT_ID", job.project_id.as_str())
            .env("WEBFORGE_DB_PATH", &self.db_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| WorkerError::Spawn {
                message: err.to_string(),
            })?;
        debug!(job_id = %job.id, pid = ?child.id(), "phase worker started");
        Ok(())
    }
}

impl<S: Store> Forge<S> {
    /// Installs the command-backed collaborators named in the config.
    pub fn with_commands(mut self, config: &ForgeConfig) -> Result<Self, ConfigError> {
        if let Some(spec) = &config.generator {
            self = self.with_generator(Arc::new(CommandGenerationClient::new(spec)?));
        }
        if let Some(spec) = &config.reviewer {
            self = self.with_reviewer(Arc::new(CommandReviewer::new(spec)?));
        }
        if let Some(spec) = &config.worker {
            self = self.with_worker(Arc::new(CommandPhaseWorker::new(
                spec,
                config.db_path_string(),
            )?));
        }
        Ok(self)
    }
}

fn limit_output(data: &[u8]) -> String {
    let end = data.len().min(OUTPUT_LIMIT);
    String::from_utf8_lossy(&data[..end]).to_string()
}
