mod common;

use chrono::{Duration, Utc};
use common::{
    RecordingWorker, TestForge, ctx, forge, session, session_for, shared, worker_ctx,
};
use tokio::sync::watch;
use wf_core::reconciler::StalenessCheck;
use wf_core::types::{
    BuildDirective, BuildJob, CreateJobInput, DependencyGraph, JobId, JobStatus, NoticeLevel,
    OwnerId, PendingBuild, PhaseReportInput, ProjectFile, ProjectId, StatusChangeInput,
};
use wf_core::{BuildOutcome, ForgeConfig, MemoryHistory, Session};

fn config() -> ForgeConfig {
    ForgeConfig {
        review: false,
        ..ForgeConfig::default()
    }
}

fn server_forge() -> TestForge {
    forge(config()).with_worker(shared(RecordingWorker::default()))
}

async fn queue(forge: &TestForge, session: &mut Session<MemoryHistory>) -> JobId {
    let outcome = forge
        .engine()
        .start_build(&ctx(), session, PendingBuild::from_prompt("a bakery site"))
        .await
        .unwrap();
    let BuildOutcome::Queued { job_id } = outcome else {
        panic!("expected queued outcome, got {outcome:?}");
    };
    job_id
}

fn create_job(forge: &TestForge, owner: &OwnerId, project: &ProjectId) -> BuildJob {
    forge
        .jobs()
        .create(
            &worker_ctx(),
            CreateJobInput {
                owner_id: owner.clone(),
                project_id: project.clone(),
                original_prompt: "a bakery site".to_string(),
                directive: BuildDirective::new("Build a bakery site"),
                dependency_graph: DependencyGraph::default(),
            },
        )
        .unwrap()
}

fn finish(forge: &TestForge, job_id: &JobId, status: JobStatus) -> BuildJob {
    if status == JobStatus::Completed {
        forge
            .jobs()
            .record_phase(
                &worker_ctx(),
                job_id,
                PhaseReportInput {
                    phase: 1,
                    files: vec![
                        ProjectFile::new("index.html", "<main>bread</main>"),
                        ProjectFile::new("src/style.css", "main { color: brown; }"),
                    ],
                },
            )
            .unwrap();
    }
    forge
        .jobs()
        .transition(
            &worker_ctx(),
            job_id,
            StatusChangeInput {
                status,
                error: Some("phase 1 crashed".to_string()).filter(|_| status.is_failed()),
            },
        )
        .unwrap()
}

fn error_notices(session: &Session<MemoryHistory>, job_id: &JobId) -> usize {
    session
        .notices()
        .iter()
        .filter(|notice| notice.level == NoticeLevel::Error && notice.job_id.as_ref() == Some(job_id))
        .count()
}

#[tokio::test]
async fn completed_job_applies_exactly_once() {
    let forge = server_forge();
    let mut session = session();
    let job_id = queue(&forge, &mut session).await;
    let completed = finish(&forge, &job_id, JobStatus::Completed);

    let reconciler = forge.reconciler();
    let first = reconciler
        .handle_update(&ctx(), &mut session, completed.clone())
        .await
        .unwrap();
    let second = reconciler
        .handle_update(&ctx(), &mut session, completed)
        .await
        .unwrap();

    assert!(matches!(
        first,
        Some(BuildOutcome::Applied {
            version: 1,
            changed: true,
            ..
        })
    ));
    assert_eq!(second, None);
    assert_eq!(session.vfs.snapshots().len(), 2);
    assert_eq!(session.vfs.files().len(), 2);
    assert!(session.was_applied(&job_id));
    assert!(!session.state.has_active_job());
    assert!(session.subscribed_job().is_none());
}

#[tokio::test]
async fn failed_apply_can_be_retried() {
    let forge = server_forge();
    let mut session = session();
    let job_id = queue(&forge, &mut session).await;
    let completed = finish(&forge, &job_id, JobStatus::Completed);

    session.vfs.persistence().set_failing(true);
    let err = forge
        .reconciler()
        .complete_job(&ctx(), &mut session, &completed)
        .await;
    assert!(err.is_err());
    assert!(!session.was_applied(&job_id));
    assert_eq!(session.vfs.snapshots().len(), 1);

    session.vfs.persistence().set_failing(false);
    let retried = forge
        .reconciler()
        .complete_job(&ctx(), &mut session, &completed)
        .await
        .unwrap();
    assert!(retried.is_some());
    assert_eq!(session.vfs.snapshots().len(), 2);
}

#[tokio::test]
async fn stale_job_times_out_with_one_notice() {
    let forge = server_forge();
    let mut session = session();
    let job_id = queue(&forge, &mut session).await;
    forge
        .jobs()
        .transition(
            &worker_ctx(),
            &job_id,
            StatusChangeInput {
                status: JobStatus::Building(2),
                error: None,
            },
        )
        .unwrap();
    let later = Utc::now() + Duration::minutes(6);
    let reconciler = forge.reconciler();

    let fresh = reconciler
        .check_staleness_at(&ctx(), &mut session, Utc::now())
        .await
        .unwrap();
    assert_eq!(fresh, StalenessCheck::Fresh);
    assert_eq!(session.state.phase_progress.current, Some(2));

    let first = reconciler
        .check_staleness_at(&ctx(), &mut session, later)
        .await
        .unwrap();
    let second = reconciler
        .check_staleness_at(&ctx(), &mut session, later)
        .await
        .unwrap();

    assert_eq!(first, StalenessCheck::TimedOut);
    assert_eq!(second, StalenessCheck::NoActiveJob);
    assert_eq!(
        forge.jobs().require(&job_id).unwrap().status,
        JobStatus::FailedTimeout
    );

    let timed_out = forge.jobs().require(&job_id).unwrap();
    reconciler
        .handle_update(&ctx(), &mut session, timed_out)
        .await
        .unwrap();
    reconciler.resume_at(&ctx(), &mut session, later).await.unwrap();

    assert_eq!(error_notices(&session, &job_id), 1);
    assert!(!session.state.is_building);
}

#[tokio::test]
async fn back_to_back_checks_on_one_session_each_run() {
    let forge = server_forge();
    let mut session = session();
    let job_id = queue(&forge, &mut session).await;
    let reconciler = forge.reconciler();

    for _ in 0..3 {
        let check = reconciler
            .check_staleness_at(&ctx(), &mut session, Utc::now())
            .await
            .unwrap();
        assert_eq!(check, StalenessCheck::Fresh);
    }

    finish(&forge, &job_id, JobStatus::Completed);
    let resolved = reconciler
        .check_staleness_at(&ctx(), &mut session, Utc::now())
        .await
        .unwrap();
    let after = reconciler
        .check_staleness_at(&ctx(), &mut session, Utc::now())
        .await
        .unwrap();

    assert_eq!(resolved, StalenessCheck::Resolved);
    assert_eq!(after, StalenessCheck::NoActiveJob);
    assert!(session.was_applied(&job_id));
}

#[tokio::test]
async fn staleness_check_resolves_a_job_that_already_finished() {
    let forge = server_forge();
    let mut session = session();
    let job_id = queue(&forge, &mut session).await;
    finish(&forge, &job_id, JobStatus::Completed);

    let check = forge
        .reconciler()
        .check_staleness_at(&ctx(), &mut session, Utc::now() + Duration::minutes(10))
        .await
        .unwrap();

    assert_eq!(check, StalenessCheck::Resolved);
    assert!(session.was_applied(&job_id));
    assert_eq!(
        forge.jobs().require(&job_id).unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn resume_reattaches_to_running_job() {
    let forge = server_forge();
    let owner = OwnerId::generate();
    let project = ProjectId::generate();
    let job = create_job(&forge, &owner, &project);
    let mut session = session_for(owner, project);

    let report = forge.reconciler().resume(&ctx(), &mut session).await.unwrap();

    assert_eq!(report.resumed, Some(job.id.clone()));
    assert_eq!(session.state.active_job_id, Some(job.id.clone()));
    assert_eq!(session.subscribed_job(), Some(job.id.as_str()));
    assert!(session.state.is_building);

    let again = forge.reconciler().resume(&ctx(), &mut session).await.unwrap();
    assert_eq!(again.resumed, None);
    assert_eq!(session.subscribed_job(), Some(job.id.as_str()));
}

#[tokio::test]
async fn resume_applies_recent_completions_once() {
    let forge = server_forge();
    let owner = OwnerId::generate();
    let project = ProjectId::generate();
    let job = create_job(&forge, &owner, &project);
    finish(&forge, &job.id, JobStatus::Completed);
    let mut session = session_for(owner, project);

    let report = forge.reconciler().resume(&ctx(), &mut session).await.unwrap();
    assert_eq!(report.applied, vec![job.id.clone()]);
    assert_eq!(session.vfs.snapshots().len(), 2);

    let again = forge.reconciler().resume(&ctx(), &mut session).await.unwrap();
    assert!(again.applied.is_empty());
    assert_eq!(session.vfs.snapshots().len(), 2);
}

#[tokio::test]
async fn resume_ignores_old_completions() {
    let forge = server_forge();
    let owner = OwnerId::generate();
    let project = ProjectId::generate();
    let job = create_job(&forge, &owner, &project);
    finish(&forge, &job.id, JobStatus::Completed);
    let mut session = session_for(owner, project);

    let report = forge
        .reconciler()
        .resume_at(&ctx(), &mut session, Utc::now() + Duration::minutes(10))
        .await
        .unwrap();

    assert!(report.applied.is_empty());
    assert_eq!(session.vfs.snapshots().len(), 1);
}

#[tokio::test]
async fn resume_surfaces_recent_failure_once() {
    let forge = server_forge();
    let owner = OwnerId::generate();
    let project = ProjectId::generate();
    let job = create_job(&forge, &owner, &project);
    finish(&forge, &job.id, JobStatus::FailedPhase(1));
    let mut session = session_for(owner, project);

    let report = forge.reconciler().resume(&ctx(), &mut session).await.unwrap();
    forge.reconciler().resume(&ctx(), &mut session).await.unwrap();

    assert_eq!(report.surfaced, vec![job.id.clone()]);
    assert_eq!(error_notices(&session, &job.id), 1);
    let notice = session.notices().last().unwrap();
    assert!(notice.message.contains("phase 1 crashed"));
}

#[tokio::test]
async fn resume_only_sees_own_project() {
    let forge = server_forge();
    let owner = OwnerId::generate();
    create_job(&forge, &owner, &ProjectId::generate());
    let mut session = session_for(owner, ProjectId::generate());

    let report = forge.reconciler().resume(&ctx(), &mut session).await.unwrap();

    assert_eq!(report.resumed, None);
    assert!(!session.state.has_active_job());
}

#[tokio::test]
async fn run_applies_realtime_completion() {
    let forge = server_forge();
    let mut session = session();
    let job_id = queue(&forge, &mut session).await;
    let (_focus_tx, focus_rx) = watch::channel(());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctx = ctx();
    let reconciler = forge.reconciler();
    let run = reconciler.run(&ctx, &mut session, focus_rx, shutdown_rx);
    let driver = async {
        tokio::task::yield_now().await;
        finish(&forge, &job_id, JobStatus::Completed);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        shutdown_tx.send_replace(true);
    };
    tokio::join!(run, driver);

    assert!(session.was_applied(&job_id));
    assert_eq!(session.vfs.snapshots().len(), 2);
    assert!(session.subscribed_job().is_none());
    assert!(!session.state.has_active_job());
}

#[tokio::test]
async fn remote_cancellation_clears_local_state() {
    let forge = server_forge();
    let mut session = session();
    let job_id = queue(&forge, &mut session).await;
    let cancelled = forge.jobs().cancel(&worker_ctx(), &job_id).unwrap();

    let outcome = forge
        .reconciler()
        .handle_update(&ctx(), &mut session, cancelled)
        .await
        .unwrap();

    assert_eq!(outcome, None);
    assert!(!session.state.has_active_job());
    assert!(session.subscribed_job().is_none());
}
