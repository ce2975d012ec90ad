#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use wf_core::error::{GenerationError, ReviewError, WorkerError};
use wf_core::generation::{GenerationClient, GenerationStream, PhaseWorker};
use wf_core::quality::QualityReviewer;
use wf_core::types::{
    BuildJob, DependencyGraph, GenerateRequest, GenerationEvent, JobId, OperationKind, OwnerId,
    PlanRequest, ProjectId, ReviewIssue, ReviewReport, ReviewRequest, ReviewVerdict,
};
use wf_core::{Forge, ForgeConfig, MemoryHistory, RequestContext, Session, VersionedFileStore};
use wf_db::DbStore;
use wf_db::schema::with_test_db;
use wf_events::bus::EventBus;
use wf_events::types::EventSource;

pub type TestForge = Forge<DbStore>;

pub fn ctx() -> RequestContext {
    RequestContext::new(EventSource::Ui, Some("corr-test".to_string()))
}

pub fn worker_ctx() -> RequestContext {
    RequestContext::new(EventSource::Worker, None)
}

pub fn forge(config: ForgeConfig) -> TestForge {
    let store = DbStore::new(with_test_db().unwrap());
    Forge::new(store, EventBus::new(256)).with_config(config)
}

pub fn session() -> Session<MemoryHistory> {
    session_for(OwnerId::generate(), ProjectId::generate())
}

pub fn session_for(owner_id: OwnerId, project_id: ProjectId) -> Session<MemoryHistory> {
    let vfs = VersionedFileStore::open(MemoryHistory::new()).unwrap();
    Session::new(owner_id, project_id, vfs)
}

/// Events that write one complete file.
pub fn file_events(path: &str, content: &str, action: OperationKind) -> Vec<GenerationEvent> {
    vec![
        GenerationEvent::FileStart {
            path: path.to_string(),
            action,
        },
        GenerationEvent::FileChunk {
            path: path.to_string(),
            text: content.to_string(),
        },
        GenerationEvent::FileDone {
            path: path.to_string(),
            content: content.to_string(),
        },
    ]
}

type BuildScript = Box<dyn Fn(usize, &GenerateRequest) -> Vec<GenerationEvent> + Send + Sync>;

/// Generation client replaying fixed plan events and computed build events.
pub struct ScriptedGenerator {
    plan: Vec<GenerationEvent>,
    build: BuildScript,
    generate_calls: AtomicUsize,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedGenerator {
    pub fn new<F>(plan: Vec<GenerationEvent>, build: F) -> Self
    where
        F: Fn(usize, &GenerateRequest) -> Vec<GenerationEvent> + Send + Sync + 'static,
    {
        Self {
            plan,
            build: Box::new(build),
            generate_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Each build rewrites `path` with content unique to the call.
    pub fn rewriting(path: &'static str) -> Self {
        Self::new(Vec::new(), move |call, _| {
            let mut events = file_events(path, &format!("v{call}"), OperationKind::Update);
            events.push(GenerationEvent::Done);
            events
        })
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn plan(&self, _request: PlanRequest) -> Result<GenerationStream, GenerationError> {
        Ok(GenerationStream::from_events(self.plan.clone()))
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationStream, GenerationError> {
        let call = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let events = (self.build)(call, &request);
        self.requests.lock().unwrap().push(request);
        Ok(GenerationStream::from_events(events))
    }
}

/// Generation client whose single build stream is fed by the test.
pub struct ChannelGenerator {
    receiver: Mutex<Option<mpsc::Receiver<GenerationEvent>>>,
}

impl ChannelGenerator {
    pub fn new() -> (Self, mpsc::Sender<GenerationEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                receiver: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl GenerationClient for ChannelGenerator {
    async fn plan(&self, _request: PlanRequest) -> Result<GenerationStream, GenerationError> {
        Ok(GenerationStream::from_events(vec![GenerationEvent::Done]))
    }

    async fn generate(
        &self,
        _request: GenerateRequest,
    ) -> Result<GenerationStream, GenerationError> {
        let receiver = self.receiver.lock().unwrap().take();
        receiver
            .map(GenerationStream::new)
            .ok_or_else(|| GenerationError::Unavailable {
                message: "stream already taken".to_string(),
            })
    }
}

#[derive(Default)]
pub struct RecordingWorker {
    triggered: Mutex<Vec<JobId>>,
    fail: bool,
}

impl RecordingWorker {
    pub fn failing() -> Self {
        Self {
            triggered: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn triggered(&self) -> Vec<JobId> {
        self.triggered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhaseWorker for RecordingWorker {
    async fn trigger(&self, job: &BuildJob) -> Result<(), WorkerError> {
        if self.fail {
            return Err(WorkerError::Spawn {
                message: "worker binary missing".to_string(),
            });
        }
        self.triggered.lock().unwrap().push(job.id.clone());
        Ok(())
    }
}

/// Reviewer returning queued reports, then repeating the fallback.
pub struct ScriptedReviewer {
    queued: Mutex<VecDeque<ReviewReport>>,
    fallback: ReviewReport,
    calls: AtomicUsize,
}

impl ScriptedReviewer {
    pub fn always(report: ReviewReport) -> Self {
        Self::sequence(Vec::new(), report)
    }

    pub fn sequence(queued: Vec<ReviewReport>, fallback: ReviewReport) -> Self {
        Self {
            queued: Mutex::new(queued.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QualityReviewer for ScriptedReviewer {
    async fn review(&self, _request: ReviewRequest) -> Result<ReviewReport, ReviewError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queued.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

pub fn approved(score: u8) -> ReviewReport {
    ReviewReport {
        status: ReviewVerdict::Approved,
        summary: "looks good".to_string(),
        issues: Vec::new(),
        fix_directive: None,
        score: Some(score),
    }
}

pub fn needs_fix(fix_directive: Option<&str>) -> ReviewReport {
    ReviewReport {
        status: ReviewVerdict::NeedsFix,
        summary: "needs work".to_string(),
        issues: vec![
            ReviewIssue {
                file: "src/App.tsx".to_string(),
                issue: "low contrast".to_string(),
            },
            ReviewIssue {
                file: "src/index.css".to_string(),
                issue: "missing focus styles".to_string(),
            },
        ],
        fix_directive: fix_directive.map(ToString::to_string),
        score: Some(40),
    }
}

pub fn empty_graph() -> DependencyGraph {
    DependencyGraph::default()
}

/// Seeds the session with one file so `auto` mode picks client mode.
pub fn seed_files(session: &mut Session<MemoryHistory>) {
    session
        .vfs
        .apply(
            vec![wf_core::types::Operation::create(
                "src/App.tsx",
                "export default function App() {}",
            )],
            "seed",
        )
        .unwrap();
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
