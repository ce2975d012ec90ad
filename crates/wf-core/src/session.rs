use crate::config::Locale;
use crate::messages::Text;
use crate::types::{BuildEngineState, JobId, Notice, NoticeLevel, OwnerId, ProjectId};
use crate::vfs::{SnapshotPersistence, VersionedFileStore};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use wf_events::bus::TopicSubscription;

/// Cancels the client-mode stream of a session from outside the build call.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl CancelToken {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Per-owner, per-project build context. Never shared between owners.
pub struct Session<P: SnapshotPersistence> {
    pub owner_id: OwnerId,
    pub project_id: ProjectId,
    pub vfs: VersionedFileStore<P>,
    pub state: BuildEngineState,
    pub fix_attempts: u32,
    pub(crate) locale: Locale,
    pub(crate) channel: Option<TopicSubscription>,
    applied: HashSet<JobId>,
    surfaced: HashSet<JobId>,
    notices: Vec<Notice>,
    cancel: CancelToken,
}

impl<P: SnapshotPersistence> Session<P> {
    pub fn new(owner_id: OwnerId, project_id: ProjectId, vfs: VersionedFileStore<P>) -> Self {
        Self {
            owner_id,
            project_id,
            vfs,
            state: BuildEngineState::default(),
            fix_attempts: 0,
            locale: Locale::default(),
            channel: None,
            applied: HashSet::new(),
            surfaced: HashSet::new(),
            notices: Vec::new(),
            cancel: CancelToken::default(),
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Job id of the realtime channel currently attached, if any.
    pub fn subscribed_job(&self) -> Option<&str> {
        self.channel.as_ref().map(TopicSubscription::topic)
    }

    pub fn was_applied(&self, job_id: &JobId) -> bool {
        self.applied.contains(job_id)
    }

    pub fn was_surfaced(&self, job_id: &JobId) -> bool {
        self.surfaced.contains(job_id)
    }

    pub(crate) fn mark_applied(&mut self, job_id: &JobId) -> bool {
        self.applied.insert(job_id.clone())
    }

    pub(crate) fn unmark_applied(&mut self, job_id: &JobId) {
        self.applied.remove(job_id);
    }

    pub(crate) fn mark_surfaced(&mut self, job_id: &JobId) -> bool {
        self.surfaced.insert(job_id.clone())
    }

    pub(crate) fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn notify(&mut self, level: NoticeLevel, text: &Text, job_id: Option<&JobId>) {
        let message = text.render(self.locale);
        match level {
            NoticeLevel::Error => error!(job_id = ?job_id, "{message}"),
            NoticeLevel::Warning => warn!(job_id = ?job_id, "{message}"),
            NoticeLevel::Info | NoticeLevel::Success => info!(job_id = ?job_id, "{message}"),
        }
        self.notices.push(Notice {
            level,
            message,
            job_id: job_id.cloned(),
        });
    }
}
