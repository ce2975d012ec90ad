//! Keeps a session in step with durable server-mode jobs: realtime updates, resume on
//! mount or focus, staleness, and exactly-once application of completed jobs.

use crate::engine::BuildOutcome;
use crate::error::ForgeError;
use crate::forge::{Forge, RequestContext, job_from_record};
use crate::messages::Text;
use crate::session::Session;
use crate::store::Store;
use crate::types::{BuildJob, BuildMode, JobFilter, JobId, JobStatus, NoticeLevel, PhaseProgress};
use crate::vfs::SnapshotPersistence;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use wf_events::bus::TopicSubscription;
use wf_events::types::EventRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    pub resumed: Option<JobId>,
    pub applied: Vec<JobId>,
    pub surfaced: Vec<JobId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StalenessCheck {
    NoActiveJob,
    Fresh,
    /// The job had already reached a terminal state and was handled as an update.
    Resolved,
    TimedOut,
}

enum Wake {
    Update(Option<EventRecord>),
    Tick,
    Focus,
    FocusClosed,
    Shutdown,
}

pub struct ReconcilerApi<'a, S: Store> {
    pub(crate) core: &'a Forge<S>,
}

impl<'a, S: Store> ReconcilerApi<'a, S> {
    /// Attaches the session to `job`'s realtime channel, replacing any previous channel.
    pub fn subscribe<P: SnapshotPersistence>(&self, session: &mut Session<P>, job: &BuildJob) {
        self.detach(session);
        session.channel = Some(self.core.event_bus.subscribe_topic(job.id.as_str()));
        session.state.active_job_id = Some(job.id.clone());
        session.state.mode = Some(BuildMode::Server);
        session.state.is_building = true;
        session.state.phase_progress = PhaseProgress::from_job(job);
        debug!(job_id = %job.id, "realtime channel attached");
    }

    pub fn detach<P: SnapshotPersistence>(&self, session: &mut Session<P>) {
        if let Some(channel) = session.channel.take() {
            debug!(topic = channel.topic(), lagged = channel.lagged(), "realtime channel detached");
        }
    }

    /// Applies one observed job record to the session.
    pub async fn handle_update<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        job: BuildJob,
    ) -> Result<Option<BuildOutcome>, ForgeError> {
        let is_active = session.state.active_job_id.as_ref() == Some(&job.id);
        match job.status {
            JobStatus::Completed => self.complete_job(ctx, session, &job).await,
            JobStatus::FailedPhase(_) | JobStatus::FailedTimeout => {
                self.surface_failure(session, &job);
                Ok(None)
            }
            JobStatus::Cancelled => {
                if is_active {
                    self.detach(session);
                    session.state.reset();
                }
                Ok(None)
            }
            JobStatus::Planning | JobStatus::Building(_) => {
                if is_active {
                    session.state.phase_progress = PhaseProgress::from_job(&job);
                } else {
                    debug!(job_id = %job.id, "update for untracked job ignored");
                }
                Ok(None)
            }
        }
    }

    /// Applies a completed job's files as one snapshot and reviews them. Runs at most once
    /// per job id; a failed apply clears the mark so a later pass can retry.
    pub async fn complete_job<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        job: &BuildJob,
    ) -> Result<Option<BuildOutcome>, ForgeError> {
        if job.status != JobStatus::Completed {
            return Ok(None);
        }
        if !session.mark_applied(&job.id) {
            debug!(job_id = %job.id, "completed job already applied");
            return Ok(None);
        }

        let is_active = session.state.active_job_id.as_ref() == Some(&job.id);
        if is_active {
            self.detach(session);
        }
        let operations = session.vfs.operations_for(&job.files());
        let applied = session
            .vfs
            .apply(operations, job.directive.label())
            .map(|snapshot| snapshot.map(|snapshot| snapshot.version));
        if is_active {
            session.state.finish_build();
        }

        let (version, changed) = match applied {
            Ok(Some(version)) => (version, true),
            Ok(None) => (session.vfs.current().version, false),
            Err(err) => {
                session.unmark_applied(&job.id);
                session.notify(NoticeLevel::Error, &Text::PersistFailed, Some(&job.id));
                return Err(err.into());
            }
        };
        info!(job_id = %job.id, version, changed, "completed job applied");
        if changed {
            session.notify(
                NoticeLevel::Success,
                &Text::BuildApplied { version },
                Some(&job.id),
            );
        } else {
            session.notify(NoticeLevel::Info, &Text::BuildUnchanged, Some(&job.id));
        }

        let review = if self.core.config.review && self.core.reviewer.is_some() {
            match self
                .core
                .quality()
                .evaluate(ctx, session, &job.directive, Some(&job.id))
                .await
            {
                Ok(review) => Some(review),
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "quality review skipped");
                    None
                }
            }
        } else {
            None
        };

        Ok(Some(BuildOutcome::Applied {
            version,
            changed,
            review,
        }))
    }

    /// Surfaces a failed job once. Returns `false` if it was already surfaced.
    pub fn surface_failure<P: SnapshotPersistence>(
        &self,
        session: &mut Session<P>,
        job: &BuildJob,
    ) -> bool {
        if session.state.active_job_id.as_ref() == Some(&job.id) {
            self.detach(session);
            session.state.finish_build();
        }
        if !session.mark_surfaced(&job.id) {
            return false;
        }
        let text = if job.status == JobStatus::FailedTimeout {
            Text::JobTimedOut
        } else {
            Text::JobFailed {
                error: job.error.clone(),
            }
        };
        session.notify(NoticeLevel::Error, &text, Some(&job.id));
        true
    }

    /// Picks up the owner's jobs for this project: re-attaches to an active job, applies
    /// recently completed ones and surfaces recent failures.
    pub async fn resume_at<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        now: DateTime<Utc>,
    ) -> Result<ResumeReport, ForgeError> {
        let mut jobs = self.core.jobs().list(&JobFilter {
            owner_id: Some(session.owner_id.clone()),
            project_id: Some(session.project_id.clone()),
            ..JobFilter::default()
        })?;
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let window = self.core.config.auto_apply_window();
        let mut report = ResumeReport::default();

        for job in jobs {
            match job.status {
                JobStatus::Planning | JobStatus::Building(_) => {
                    if session.state.active_job_id.as_ref() == Some(&job.id) {
                        if session.channel.is_none() {
                            self.subscribe(session, &job);
                        } else {
                            session.state.phase_progress = PhaseProgress::from_job(&job);
                        }
                        continue;
                    }
                    if session.state.has_active_job() {
                        warn!(job_id = %job.id, "second active job ignored");
                        continue;
                    }
                    self.subscribe(session, &job);
                    session.notify(NoticeLevel::Info, &Text::ResumedJob, Some(&job.id));
                    report.resumed = Some(job.id.clone());
                }
                JobStatus::Completed => {
                    if session.was_applied(&job.id) || !job.completed_within(now, window) {
                        continue;
                    }
                    match self.complete_job(ctx, session, &job).await {
                        Ok(Some(_)) => report.applied.push(job.id.clone()),
                        Ok(None) => {}
                        Err(err) => warn!(job_id = %job.id, error = %err, "resume apply failed"),
                    }
                }
                JobStatus::FailedPhase(_) | JobStatus::FailedTimeout => {
                    if session.was_surfaced(&job.id) || !job.completed_within(now, window) {
                        continue;
                    }
                    if self.surface_failure(session, &job) {
                        report.surfaced.push(job.id.clone());
                    }
                }
                JobStatus::Cancelled => {}
            }
        }
        Ok(report)
    }

    pub async fn resume<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
    ) -> Result<ResumeReport, ForgeError> {
        self.resume_at(ctx, session, Utc::now()).await
    }

    /// Polls the active job. Past the stale threshold it is marked `failed_timeout`
    /// (best-effort) and one failure notice is surfaced. The `&mut Session` borrow keeps
    /// passes over one session from overlapping.
    pub async fn check_staleness_at<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        now: DateTime<Utc>,
    ) -> Result<StalenessCheck, ForgeError> {
        let Some(job_id) = session.state.active_job_id.clone() else {
            return Ok(StalenessCheck::NoActiveJob);
        };
        self.check_job(ctx, session, &job_id, now).await
    }

    async fn check_job<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        job_id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<StalenessCheck, ForgeError> {
        let Some(job) = self.core.jobs().get(job_id)? else {
            warn!(job_id = %job_id, "active job disappeared");
            self.detach(session);
            session.state.reset();
            return Ok(StalenessCheck::Resolved);
        };
        if job.status.is_terminal() {
            self.handle_update(ctx, session, job).await?;
            return Ok(StalenessCheck::Resolved);
        }
        if !job.is_stale(now, self.core.config.stale_after()) {
            session.state.phase_progress = PhaseProgress::from_job(&job);
            return Ok(StalenessCheck::Fresh);
        }

        let timed_out = match self.core.jobs().mark_timed_out(ctx, job_id) {
            Ok(job) => job,
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "failed to mark job timed out");
                BuildJob {
                    status: JobStatus::FailedTimeout,
                    ..job
                }
            }
        };
        if timed_out.status != JobStatus::FailedTimeout {
            self.handle_update(ctx, session, timed_out).await?;
            return Ok(StalenessCheck::Resolved);
        }
        self.surface_failure(session, &timed_out);
        Ok(StalenessCheck::TimedOut)
    }

    /// Multiplexes realtime updates, the staleness interval and focus signals until
    /// `shutdown` turns true. Resumes once on entry.
    pub async fn run<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        mut focus: watch::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(self.core.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut focus_open = true;

        if let Err(err) = self.resume(ctx, session).await {
            warn!(error = %err, "resume failed");
        }

        loop {
            let wake = tokio::select! {
                update = next_update(session.channel.as_mut()) => Wake::Update(update),
                _ = interval.tick() => Wake::Tick,
                changed = focus.changed(), if focus_open => match changed {
                    Ok(()) => Wake::Focus,
                    Err(_) => Wake::FocusClosed,
                },
                _ = shutdown.wait_for(|stop| *stop) => Wake::Shutdown,
            };

            match wake {
                Wake::Update(Some(record)) => {
                    let Some(job) = job_from_record(&record) else {
                        continue;
                    };
                    if let Err(err) = self.handle_update(ctx, session, job).await {
                        warn!(error = %err, "realtime update failed");
                    }
                }
                Wake::Update(None) => {
                    warn!("event bus closed");
                    self.detach(session);
                }
                Wake::Tick => {
                    if let Err(err) = self.check_staleness_at(ctx, session, Utc::now()).await {
                        warn!(error = %err, "staleness check failed");
                    }
                }
                Wake::Focus => {
                    if let Err(err) = self.resume(ctx, session).await {
                        warn!(error = %err, "resume on focus failed");
                    }
                }
                Wake::FocusClosed => focus_open = false,
                Wake::Shutdown => break,
            }
        }
        self.detach(session);
    }
}

async fn next_update(channel: Option<&mut TopicSubscription>) -> Option<EventRecord> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}
