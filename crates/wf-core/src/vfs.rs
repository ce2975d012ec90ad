//! Versioned file store: the current file set of one project plus a linear history of
//! immutable snapshots with undo and redo.

use crate::error::VfsError;
use crate::types::{Operation, OperationKind, ProjectFile, Snapshot};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Ordered snapshots and the index of the visible one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    snapshots: Vec<Snapshot>,
    current_index: usize,
}

impl Default for History {
    fn default() -> Self {
        Self {
            snapshots: vec![Snapshot::initial()],
            current_index: 0,
        }
    }
}

impl History {
    pub fn from_parts(snapshots: Vec<Snapshot>, current_index: usize) -> Result<Self, VfsError> {
        if snapshots.is_empty() {
            return Err(VfsError::CorruptHistory {
                message: "history has no snapshots".to_string(),
            });
        }
        if current_index >= snapshots.len() {
            return Err(VfsError::CorruptHistory {
                message: format!(
                    "current index {current_index} outside {} snapshots",
                    snapshots.len()
                ),
            });
        }
        if snapshots
            .windows(2)
            .any(|pair| pair[1].version <= pair[0].version)
        {
            return Err(VfsError::CorruptHistory {
                message: "snapshot versions are not increasing".to_string(),
            });
        }
        Ok(Self {
            snapshots,
            current_index,
        })
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &Snapshot {
        &self.snapshots[self.current_index]
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Durable storage for one project's history.
pub trait SnapshotPersistence {
    /// Called after an append. Snapshots before the last one are already stored and unchanged.
    fn save(&self, history: &History) -> Result<(), VfsError>;

    /// Called after undo or redo, when only the cursor moved.
    fn save_cursor(&self, history: &History) -> Result<(), VfsError> {
        self.save(history)
    }

    fn load(&self) -> Result<Option<History>, VfsError>;
}

#[derive(Clone, Copy)]
enum Change {
    Appended,
    CursorMoved,
}

#[derive(Debug, Default)]
struct MemoryState {
    saved: Option<History>,
    fail_saves: bool,
    saves: u32,
}

/// In-process persistence. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent save fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.lock().fail_saves = failing;
    }

    pub fn save_count(&self) -> u32 {
        self.lock().saves
    }

    pub fn saved(&self) -> Option<History> {
        self.lock().saved.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotPersistence for MemoryHistory {
    fn save(&self, history: &History) -> Result<(), VfsError> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(VfsError::Persist {
                message: "memory store rejected write".to_string(),
            });
        }
        state.saved = Some(history.clone());
        state.saves += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<History>, VfsError> {
        Ok(self.lock().saved.clone())
    }
}

pub struct VersionedFileStore<P: SnapshotPersistence> {
    history: History,
    persistence: P,
}

impl<P: SnapshotPersistence> VersionedFileStore<P> {
    /// Loads persisted history, or starts from the initial empty snapshot.
    pub fn open(persistence: P) -> Result<Self, VfsError> {
        let history = persistence.load()?.unwrap_or_default();
        Ok(Self {
            history,
            persistence,
        })
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn current(&self) -> &Snapshot {
        self.history.current()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        self.history.snapshots()
    }

    pub fn files(&self) -> Vec<ProjectFile> {
        self.current().files.values().cloned().collect()
    }

    pub fn has_files(&self) -> bool {
        !self.current().files.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.history.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history.current_index + 1 < self.history.snapshots.len()
    }

    /// Folds `operations` into one new snapshot. Returns `None` when the batch leaves
    /// every path's content as it was.
    pub fn apply(
        &mut self,
        operations: Vec<Operation>,
        message: impl Into<String>,
    ) -> Result<Option<&Snapshot>, VfsError> {
        let current = &self.current().files;
        let mut contents: BTreeMap<String, String> = current
            .iter()
            .map(|(path, file)| (path.clone(), file.content.clone()))
            .collect();

        for operation in operations {
            match operation.kind {
                OperationKind::Create => {
                    if contents.contains_key(&operation.path) {
                        debug!(path = %operation.path, "create ignored, path exists");
                        continue;
                    }
                    contents.insert(operation.path, operation.content.unwrap_or_default());
                }
                OperationKind::Update => {
                    let Some(slot) = contents.get_mut(&operation.path) else {
                        debug!(path = %operation.path, "update ignored, path missing");
                        continue;
                    };
                    if let Some(content) = operation.content {
                        *slot = content;
                    }
                }
                OperationKind::Delete => {
                    contents.remove(&operation.path);
                }
            }
        }

        let unchanged = contents.len() == current.len()
            && contents.iter().all(|(path, content)| {
                current
                    .get(path)
                    .is_some_and(|file| &file.content == content)
            });
        if unchanged {
            return Ok(None);
        }

        // Revisions move once per path whose final content differs.
        let files: BTreeMap<String, ProjectFile> = contents
            .into_iter()
            .map(|(path, content)| {
                let file = match current.get(&path) {
                    Some(existing) if existing.content == content => existing.clone(),
                    Some(existing) => ProjectFile {
                        content,
                        revision: existing.revision + 1,
                        ..existing.clone()
                    },
                    None => ProjectFile::new(path.clone(), content),
                };
                (path, file)
            })
            .collect();

        let previous = self.history.clone();
        let index = self.history.current_index;
        let version = self.current().version + 1;
        self.history.snapshots.truncate(index + 1);
        self.history.snapshots.push(Snapshot {
            version,
            at: Utc::now(),
            files,
            message: message.into(),
        });
        self.history.current_index = index + 1;
        self.persist(previous, Change::Appended)?;
        Ok(Some(self.current()))
    }

    /// Steps back one snapshot. `None` at the initial snapshot.
    pub fn undo(&mut self) -> Result<Option<&Snapshot>, VfsError> {
        if !self.can_undo() {
            return Ok(None);
        }
        let previous = self.history.clone();
        self.history.current_index -= 1;
        self.persist(previous, Change::CursorMoved)?;
        Ok(Some(self.current()))
    }

    /// Steps forward one snapshot. `None` at the tail.
    pub fn redo(&mut self) -> Result<Option<&Snapshot>, VfsError> {
        if !self.can_redo() {
            return Ok(None);
        }
        let previous = self.history.clone();
        self.history.current_index += 1;
        self.persist(previous, Change::CursorMoved)?;
        Ok(Some(self.current()))
    }

    /// Create or Update operations that bring the current file set in line with `files`.
    pub fn operations_for(&self, files: &[ProjectFile]) -> Vec<Operation> {
        files
            .iter()
            .map(|file| {
                if self.current().files.contains_key(&file.path) {
                    Operation::update(file.path.clone(), file.content.clone())
                } else {
                    Operation::create(file.path.clone(), file.content.clone())
                }
            })
            .collect()
    }

    /// Re-reads the persisted history, discarding unsaved in-memory state.
    pub fn reload(&mut self) -> Result<(), VfsError> {
        self.history = self.persistence.load()?.unwrap_or_default();
        Ok(())
    }

    fn persist(&mut self, previous: History, change: Change) -> Result<(), VfsError> {
        let saved = match change {
            Change::Appended => self.persistence.save(&self.history),
            Change::CursorMoved => self.persistence.save_cursor(&self.history),
        };
        let Err(err) = saved else {
            return Ok(());
        };
        warn!(error = %err, "history save failed, restoring last persisted state");
        match self.persistence.load() {
            Ok(Some(history)) => self.history = history,
            Ok(None) | Err(_) => self.history = previous,
        }
        Err(err)
    }
}
