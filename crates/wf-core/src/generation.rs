use crate::error::{GenerationError, WorkerError};
use crate::types::{
    BuildJob, GenerateRequest, GenerationEvent, Operation, OperationKind, PlanRequest,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::warn;

/// Events of one generation call, consumed in order by a single task.
pub struct GenerationStream {
    events: mpsc::Receiver<GenerationEvent>,
    producer: Option<AbortHandle>,
}

impl GenerationStream {
    pub fn new(events: mpsc::Receiver<GenerationEvent>) -> Self {
        Self {
            events,
            producer: None,
        }
    }

    /// Stream whose producer task is aborted when the stream is cancelled.
    pub fn with_producer(events: mpsc::Receiver<GenerationEvent>, producer: AbortHandle) -> Self {
        Self {
            events,
            producer: Some(producer),
        }
    }

    /// A stream that yields `events` and then ends.
    pub fn from_events(events: Vec<GenerationEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Self::new(rx)
    }

    pub async fn next(&mut self) -> Option<GenerationEvent> {
        self.events.recv().await
    }

    pub fn abort(&mut self) {
        self.events.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// The external generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Planning stream: thinking steps, message text and a `build-ready` directive.
    async fn plan(&self, request: PlanRequest) -> Result<GenerationStream, GenerationError>;
    /// Build stream: file edits for one directive.
    async fn generate(&self, request: GenerateRequest)
    -> Result<GenerationStream, GenerationError>;
}

/// Starts the out-of-process worker that drives a durable job through its phases.
#[async_trait]
pub trait PhaseWorker: Send + Sync {
    async fn trigger(&self, job: &BuildJob) -> Result<(), WorkerError>;
}

#[derive(Debug)]
struct FileBuffer {
    action: OperationKind,
    content: String,
    finished: bool,
}

/// Buffers streamed file edits per path until the stream completes.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    order: Vec<String>,
    files: BTreeMap<String, FileBuffer>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn start(&mut self, path: &str, action: OperationKind) {
        let buffer = self.entry(path, action);
        buffer.action = action;
        buffer.content.clear();
        buffer.finished = false;
    }

    pub fn chunk(&mut self, path: &str, text: &str) {
        let buffer = self.entry(path, OperationKind::Create);
        if buffer.finished {
            return;
        }
        buffer.content.push_str(text);
    }

    pub fn finish(&mut self, path: &str, content: String) {
        let buffer = self.entry(path, OperationKind::Create);
        buffer.content = content;
        buffer.finished = true;
    }

    /// Returns `true` when the event was a file edit.
    pub fn accept(&mut self, event: &GenerationEvent) -> bool {
        match event {
            GenerationEvent::FileStart { path, action } => self.start(path, *action),
            GenerationEvent::FileChunk { path, text } => self.chunk(path, text),
            GenerationEvent::FileDone { path, content } => self.finish(path, content.clone()),
            GenerationEvent::ThinkingStep { .. }
            | GenerationEvent::BuildReady { .. }
            | GenerationEvent::MessageDelta { .. }
            | GenerationEvent::Done
            | GenerationEvent::Error { .. } => return false,
        }
        true
    }

    /// Operations for every buffered path, in the order paths first appeared.
    pub fn into_operations(mut self) -> Vec<Operation> {
        let mut operations = Vec::with_capacity(self.order.len());
        for path in self.order {
            let Some(buffer) = self.files.remove(&path) else {
                continue;
            };
            if !buffer.finished {
                warn!(%path, "stream ended before file-done, using streamed content");
            }
            let operation = match buffer.action {
                OperationKind::Create => Operation::create(path, buffer.content),
                OperationKind::Update => Operation::update(path, buffer.content),
                OperationKind::Delete => Operation::delete(path),
            };
            operations.push(operation);
        }
        operations
    }

    fn entry(&mut self, path: &str, action: OperationKind) -> &mut FileBuffer {
        if !self.files.contains_key(path) {
            self.order.push(path.to_string());
        }
        self.files
            .entry(path.to_string())
            .or_insert_with(|| FileBuffer {
                action,
                content: String::new(),
                finished: false,
            })
    }
}
