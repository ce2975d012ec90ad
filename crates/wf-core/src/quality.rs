use crate::engine::BuildOutcome;
use crate::error::{ForgeError, ReviewError};
use crate::forge::{Forge, RequestContext};
use crate::messages::Text;
use crate::session::Session;
use crate::store::Store;
use crate::types::event::EventBody;
use crate::types::{
    BuildDirective, GateOutcome, JobId, NoticeLevel, QualityReport, ReviewIssue, ReviewReport,
    ReviewRequest, ReviewStatus, ReviewVerdict,
};
use crate::vfs::SnapshotPersistence;
use async_trait::async_trait;
use tracing::{info, warn};

/// Automated reviewer run over a completed build.
#[async_trait]
pub trait QualityReviewer: Send + Sync {
    async fn review(&self, request: ReviewRequest) -> Result<ReviewReport, ReviewError>;
}

pub struct QualityApi<'a, S: Store> {
    pub(crate) core: &'a Forge<S>,
}

impl<'a, S: Store> QualityApi<'a, S> {
    /// Reviews the current files and resubmits fix directives in client mode until the
    /// reviewer approves or the fix budget runs out.
    pub async fn evaluate<P: SnapshotPersistence>(
        &self,
        ctx: &RequestContext,
        session: &mut Session<P>,
        directive: &BuildDirective,
        job_id: Option<&JobId>,
    ) -> Result<GateOutcome, ForgeError> {
        let Some(reviewer) = self.core.reviewer.clone() else {
            return Err(ReviewError::Unavailable {
                message: "no reviewer configured".to_string(),
            }
            .into());
        };
        let max_attempts = self.core.config.max_fix_attempts;

        let (outcome, report) = loop {
            session.state.review_status = Some(ReviewStatus::Reviewing);
            let request = ReviewRequest {
                directive: directive.prompt.clone(),
                files: session.vfs.files(),
            };
            let report = match reviewer.review(request).await {
                Ok(report) => report,
                Err(err) => {
                    warn!(error = %err, "reviewer failed");
                    session.state.review_status = None;
                    session.notify(NoticeLevel::Warning, &Text::ReviewFailed, job_id);
                    return Err(err.into());
                }
            };

            if report.status == ReviewVerdict::Approved {
                session.fix_attempts = 0;
                session.state.review_status = Some(ReviewStatus::Approved);
                session.state.fix_suggestion = None;
                session.notify(
                    NoticeLevel::Success,
                    &Text::ReviewApproved {
                        summary: report.summary.clone(),
                    },
                    job_id,
                );
                let outcome = GateOutcome::Approved {
                    summary: report.summary.clone(),
                };
                break (outcome, report);
            }

            let fix_directive = report
                .fix_directive
                .as_ref()
                .filter(|fix| !fix.trim().is_empty())
                .cloned();
            let Some(fix_directive) = fix_directive.filter(|_| session.fix_attempts < max_attempts)
            else {
                session.state.review_status = None;
                session.state.fix_suggestion = None;
                session.notify(
                    NoticeLevel::Warning,
                    &Text::ReviewExhausted {
                        issues: describe(&report.issues),
                    },
                    job_id,
                );
                let outcome = GateOutcome::Rejected {
                    issues: report.issues.clone(),
                };
                break (outcome, report);
            };

            session.fix_attempts += 1;
            info!(attempt = session.fix_attempts, max = max_attempts, "resubmitting fix");
            session.notify(
                NoticeLevel::Info,
                &Text::ReviewIssues {
                    attempt: session.fix_attempts,
                    max: max_attempts,
                    issues: describe(&report.issues),
                },
                job_id,
            );
            session.state.review_status = Some(ReviewStatus::Fixing);
            session.state.fix_suggestion = Some(fix_directive.clone());

            let fix = BuildDirective::new(fix_directive.clone());
            let built = self.core.engine().run_client_build(session, &fix).await?;
            if !matches!(built, BuildOutcome::Applied { .. }) {
                session.state.review_status = None;
                let outcome = GateOutcome::NeedsFix {
                    fix_directive,
                    issues: report.issues.clone(),
                };
                break (outcome, report);
            }
        };

        self.record(ctx, session.fix_attempts, job_id, &outcome, &report);
        Ok(outcome)
    }

    fn record(
        &self,
        ctx: &RequestContext,
        fix_attempts: u32,
        job_id: Option<&JobId>,
        outcome: &GateOutcome,
        report: &ReviewReport,
    ) {
        if let Some(job_id) = job_id {
            let quality = QualityReport {
                outcome: outcome.clone(),
                summary: report.summary.clone(),
                fix_attempts,
            };
            if let Err(err) = self
                .core
                .jobs()
                .set_quality(ctx, job_id, report.score, quality)
            {
                warn!(job_id = %job_id, error = %err, "failed to store quality report");
            }
        }
        let body = EventBody::ReviewCompleted {
            job_id: job_id.cloned(),
            outcome: outcome.clone(),
        };
        if let Err(err) = self.core.events().record(ctx, body) {
            warn!(error = %err, "failed to record review event");
        }
    }
}

fn describe(issues: &[ReviewIssue]) -> Vec<String> {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.file, issue.issue))
        .collect()
}
