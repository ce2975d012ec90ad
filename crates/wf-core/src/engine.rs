use crate::error::{ForgeError, GenerationError, JobError, WorkerError};
use crate::forge::{Forge, RequestContext};
use crate::generation::{GenerationClient, StreamAccumulator};
use crate::messages::Text;
use crate::session::Session;
use crate::store::Store;
use crate::types::{
    BuildDirective, BuildJob, BuildMode, CreateJobInput, GateOutcome, GenerateRequest,
    GenerationEvent, JobId, JobStatus, NoticeLevel, PendingBuild, PhaseProgress, PlanRequest,
    StatusChangeInput,
};
use crate::vfs::SnapshotPersistence;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// Result of one build request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Client-mode edits were applied. `changed` is false when the batch was a no-op.
    Applied {
        version: u32,
        changed: bool,
        review: Option<GateOutcome>,
    },
    /// A durable server-mode job was created and handed to the phase worker.
    Queued { job_id: JobId },
    Failed { message: String },
    Cancelled,
}

enum Streamed {
    Finished,
    Failed(GenerationError),
    Cancelled,
}

pub struct EngineApi<'a, S: Store> {
    pub(crate) core: &'a Forge<S>,
}

impl<'a, S: Store> EngineApi<'a, S> {
    /// Runs the planning stream and stores the resulting directive as the pending build.
    pub async fn plan<P: SnapshotPersistence>(
        &self,
        session: &mut Session<P>,
        prompt: &str,
    ) -> Result<PendingBuild, ForgeError> {
        let generator = match self.generator() {
            Ok(generator) => generator,
            Err(err) => return Err(generation_failed(session, err)),
        };
        session.state.is_thinking = true;
        session.state.thinking_steps.clear();
        session.state.message.clear();

        let request = PlanRequest {
            prompt: prompt.to_string(),
            existing_paths: session
                .vfs
                .current()
                .paths()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        };
        let mut stream = match generator.plan(request).await {
            Ok(stream) => stream,
            Err(err) => return Err(generation_failed(session, err)),
        };

        let mut pending = None;
        while let Some(event) = stream.next().await {
            match event {
                GenerationEvent::ThinkingStep { text } => session.state.thinking_steps.push(text),
                GenerationEvent::MessageDelta { text } => session.state.message.push_str(&text),
                GenerationEvent::BuildReady {
                    directive,
                    summary,
                    project_name,
                    dependency_graph,
                } => {
                    pending = Some(PendingBuild {
                        original_prompt: prompt.to_string(),
                        directive: BuildDirective {
                            prompt: directive,
                            summary,
                            project_name,
                        },
                        dependency_graph,
                    });
                }
                GenerationEvent::Done => break,
                GenerationEvent::Error { message, code } => {
                    let err = GenerationError::from_event(code.as_deref(), &message);
                    return Err(generation_failed(session, err));
                }
                GenerationEvent::FileStart { .. }
                | GenerationEvent::FileChunk { .. }
                | GenerationEvent::FileDone { .. } => {
                    debug!("file event ignored while planning");
                }
            }
        }

        session.state.is_thinking = false;
        let pending = pending.unwrap_or_else(|| PendingBuild::from_prompt(prompt));
        session.state.build_directive = Some(pending.clone());
        Ok(pending)
    }

    /// Plans `prompt` and builds the resulting directive.
    pub async fn submit<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        prompt: &str,
    ) -> Result<BuildOutcome, ForgeError> {
        ensure_idle(session)?;
        let pending = self.plan(session, prompt).await?;
        self.start_build(ctx, session, pending).await
    }

    /// Starts a user-initiated build. Refused without side effects while another build is active.
    pub async fn start_build<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        pending: PendingBuild,
    ) -> Result<BuildOutcome, ForgeError> {
        ensure_idle(session)?;
        session.fix_attempts = 0;
        session.state.build_directive = None;

        let mode = self.core.config.mode.select(session.vfs.has_files());
        info!(?mode, directive = pending.directive.label(), "starting build");
        match mode {
            BuildMode::Client => self.start_client_build(ctx, session, pending).await,
            BuildMode::Server => self.start_server_build(ctx, session, pending).await,
        }
    }

    /// Cancels the active build. The remote flag is best-effort; local state is always cleared.
    pub fn cancel<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
    ) -> Option<BuildJob> {
        let job_id = session.state.active_job_id.clone();
        let job = job_id
            .as_ref()
            .and_then(|id| match self.core.jobs().cancel(ctx, id) {
                Ok(job) => Some(job),
                Err(err) => {
                    warn!(job_id = %id, error = %err, "remote cancel failed");
                    None
                }
            });
        self.core.reconciler().detach(session);
        session.state.reset();
        session.notify(NoticeLevel::Info, &Text::BuildCancelled, job_id.as_ref());
        job
    }

    async fn start_client_build<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        pending: PendingBuild,
    ) -> Result<BuildOutcome, ForgeError> {
        let outcome = self.run_client_build(session, &pending.directive).await?;
        let BuildOutcome::Applied {
            version, changed, ..
        } = outcome
        else {
            return Ok(outcome);
        };
        let review = if self.core.config.review && self.core.reviewer.is_some() {
            match self
                .core
                .quality()
                .evaluate(ctx, session, &pending.directive, None)
                .await
            {
                Ok(review) => Some(review),
                Err(err) => {
                    warn!(error = %err, "quality review skipped");
                    None
                }
            }
        } else {
            None
        };
        Ok(BuildOutcome::Applied {
            version,
            changed,
            review,
        })
    }

    async fn start_server_build<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        pending: PendingBuild,
    ) -> Result<BuildOutcome, ForgeError> {
        let job = self.core.jobs().create(
            ctx,
            CreateJobInput {
                owner_id: session.owner_id.clone(),
                project_id: session.project_id.clone(),
                original_prompt: pending.original_prompt,
                directive: pending.directive,
                dependency_graph: pending.dependency_graph,
            },
        )?;
        session.state.active_job_id = Some(job.id.clone());
        session.state.mode = Some(BuildMode::Server);
        session.state.is_building = true;
        self.core.reconciler().subscribe(session, &job);

        let triggered = match &self.core.worker {
            Some(worker) => worker.trigger(&job).await,
            None => Err(WorkerError::NotConfigured),
        };
        if let Err(err) = triggered {
            warn!(job_id = %job.id, error = %err, "phase worker did not start");
            let failed = self
                .core
                .jobs()
                .transition(
                    ctx,
                    &job.id,
                    StatusChangeInput {
                        status: JobStatus::FailedPhase(1),
                        error: Some(err.to_string()),
                    },
                )
                .unwrap_or_else(|transition_err| {
                    warn!(job_id = %job.id, error = %transition_err, "failed to record worker failure");
                    job.clone()
                });
            let message = err.to_string();
            self.core.reconciler().surface_failure(session, &failed);
            return Ok(BuildOutcome::Failed { message });
        }

        session.notify(NoticeLevel::Info, &Text::BuildQueued, Some(&job.id));
        Ok(BuildOutcome::Queued { job_id: job.id })
    }

    /// Streams one client-mode build and applies its edits as a single snapshot.
    pub(crate) async fn run_client_build<P: SnapshotPersistence>(
        &self,
        session: &mut Session<P>,
        directive: &BuildDirective,
    ) -> Result<BuildOutcome, ForgeError> {
        let generator = match self.generator() {
            Ok(generator) => generator,
            Err(err) => return Ok(client_failed(session, &err)),
        };
        let cancel = session.cancel_token();
        cancel.reset();
        session.state.is_building = true;
        session.state.mode = Some(BuildMode::Client);
        session.state.thinking_steps.clear();
        session.state.message.clear();
        session.state.phase_progress = PhaseProgress {
            message: Some(directive.label().to_string()),
            ..PhaseProgress::default()
        };

        let request = GenerateRequest {
            directive: directive.clone(),
            files: session.vfs.files(),
        };
        let mut stream = match generator.generate(request).await {
            Ok(stream) => stream,
            Err(err) => return Ok(client_failed(session, &err)),
        };

        let mut accumulator = StreamAccumulator::new();
        let streamed = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    stream.abort();
                    break Streamed::Cancelled;
                }
                event = stream.next() => match event {
                    Some(GenerationEvent::Done) => break Streamed::Finished,
                    None => {
                        break Streamed::Failed(GenerationError::Aborted {
                            message: "stream closed before done".to_string(),
                        });
                    }
                    Some(GenerationEvent::Error { message, code }) => {
                        break Streamed::Failed(GenerationError::from_event(code.as_deref(), &message));
                    }
                    Some(GenerationEvent::ThinkingStep { text }) => {
                        session.state.thinking_steps.push(text);
                    }
                    Some(GenerationEvent::MessageDelta { text }) => {
                        session.state.message.push_str(&text);
                    }
                    Some(GenerationEvent::BuildReady { .. }) => {
                        debug!("build-ready ignored while building");
                    }
                    Some(event) => {
                        accumulator.accept(&event);
                    }
                },
            }
        };
        cancel.reset();

        match streamed {
            Streamed::Cancelled => {
                debug!(discarded = accumulator.len(), "client stream cancelled");
                session.state.reset();
                session.notify(NoticeLevel::Info, &Text::BuildCancelled, None);
                Ok(BuildOutcome::Cancelled)
            }
            Streamed::Failed(err) => Ok(client_failed(session, &err)),
            Streamed::Finished => {
                let operations = accumulator.into_operations();
                let applied = session
                    .vfs
                    .apply(operations, directive.label())
                    .map(|snapshot| snapshot.map(|snapshot| snapshot.version));
                session.state.finish_build();
                match applied {
                    Ok(Some(version)) => {
                        session.notify(
                            NoticeLevel::Success,
                            &Text::BuildApplied { version },
                            None,
                        );
                        Ok(BuildOutcome::Applied {
                            version,
                            changed: true,
                            review: None,
                        })
                    }
                    Ok(None) => {
                        session.notify(NoticeLevel::Info, &Text::BuildUnchanged, None);
                        Ok(BuildOutcome::Applied {
                            version: session.vfs.current().version,
                            changed: false,
                            review: None,
                        })
                    }
                    Err(err) => {
                        session.notify(NoticeLevel::Error, &Text::PersistFailed, None);
                        Err(err.into())
                    }
                }
            }
        }
    }

    fn generator(&self) -> Result<Arc<dyn GenerationClient>, GenerationError> {
        self.core
            .generator
            .clone()
            .ok_or_else(|| GenerationError::Unavailable {
                message: "no generation client configured".to_string(),
            })
    }
}

fn ensure_idle<P: SnapshotPersistence>(session: &Session<P>) -> Result<(), JobError> {
    if let Some(job_id) = &session.state.active_job_id {
        return Err(JobError::ActiveJobExists {
            job_id: job_id.clone(),
        });
    }
    if session.state.is_building {
        return Err(JobError::BuildInProgress);
    }
    Ok(())
}

fn generation_failed<P: SnapshotPersistence>(
    session: &mut Session<P>,
    err: GenerationError,
) -> ForgeError {
    warn!(error = %err, "planning failed");
    session.state.is_thinking = false;
    session.notify(NoticeLevel::Error, &Text::GenerationFailed(err.kind()), None);
    err.into()
}

fn client_failed<P: SnapshotPersistence>(
    session: &mut Session<P>,
    err: &GenerationError,
) -> BuildOutcome {
    warn!(error = %err, "client build failed");
    let text = Text::GenerationFailed(err.kind());
    let message = text.render(session.locale());
    session.state.finish_build();
    session.notify(NoticeLevel::Error, &text, None);
    BuildOutcome::Failed { message }
}
