use crate::schema;
use crate::util::{decode_json, encode_json, from_rfc3339, to_rfc3339};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use wf_core::error::VfsError;
use wf_core::types::{ProjectFile, ProjectId, Snapshot};
use wf_core::vfs::{History, SnapshotPersistence};

/// SQLite persistence for one project's history. Owns its connection so a
/// `VersionedFileStore` can hold it independently of the job store.
pub struct SnapshotRepo {
    conn: Connection,
    project_id: ProjectId,
}

impl SnapshotRepo {
    pub fn new(conn: Connection, project_id: ProjectId) -> Self {
        Self { conn, project_id }
    }

    pub fn open(path: &str, project_id: ProjectId) -> Result<Self, VfsError> {
        let conn = schema::open_and_migrate(path).map_err(|err| VfsError::Load {
            message: err.to_string(),
        })?;
        Ok(Self::new(conn, project_id))
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Stores snapshots missing from the table. Rows at or past the tail version belong to a
    /// discarded redo branch and are replaced.
    fn write(&self, history: &History) -> Result<(), VfsError> {
        let persist = |err: rusqlite::Error| VfsError::Persist {
            message: err.to_string(),
        };
        let tail_version = history
            .snapshots()
            .last()
            .map(|snapshot| snapshot.version)
            .unwrap_or_default();
        self.conn
            .execute(
                "DELETE FROM snapshots WHERE project_id = ?1 AND version >= ?2",
                rusqlite::params![self.project_id.as_str(), tail_version],
            )
            .map_err(persist)?;

        let mut select = self
            .conn
            .prepare("SELECT version FROM snapshots WHERE project_id = ?1")
            .map_err(persist)?;
        let stored = select
            .query_map([self.project_id.as_str()], |row| row.get::<_, u32>(0))
            .map_err(persist)?
            .collect::<Result<HashSet<u32>, _>>()
            .map_err(persist)?;

        let mut insert = self
            .conn
            .prepare(
                "INSERT INTO snapshots (project_id, version, at, message, files_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(persist)?;
        for snapshot in history
            .snapshots()
            .iter()
            .filter(|snapshot| !stored.contains(&snapshot.version))
        {
            let files: Vec<&ProjectFile> = snapshot.files.values().collect();
            let files_json = encode_json(&files).map_err(|err| VfsError::Persist {
                message: err.to_string(),
            })?;
            insert
                .execute(rusqlite::params![
                    self.project_id.as_str(),
                    snapshot.version,
                    to_rfc3339(&snapshot.at),
                    snapshot.message,
                    files_json,
                ])
                .map_err(persist)?;
        }

        self.write_cursor(history)
    }

    fn write_cursor(&self, history: &History) -> Result<(), VfsError> {
        self.conn
            .execute(
                "INSERT INTO history_cursor (project_id, current_index, len) VALUES (?1, ?2, ?3)
                 ON CONFLICT (project_id) DO UPDATE SET current_index = excluded.current_index, len = excluded.len",
                rusqlite::params![
                    self.project_id.as_str(),
                    i64::try_from(history.current_index()).unwrap_or(i64::MAX),
                    i64::try_from(history.len()).unwrap_or(i64::MAX),
                ],
            )
            .map_err(|err| VfsError::Persist {
                message: err.to_string(),
            })?;
        Ok(())
    }

    fn in_transaction(
        &self,
        write: impl FnOnce() -> Result<(), VfsError>,
    ) -> Result<(), VfsError> {
        let persist = |err: rusqlite::Error| VfsError::Persist {
            message: err.to_string(),
        };
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(persist)?;
        match write() {
            Ok(()) => self.conn.execute_batch("COMMIT").map_err(persist),
            Err(err) => {
                self.conn.execute_batch("ROLLBACK").map_err(persist)?;
                Err(err)
            }
        }
    }
}

impl SnapshotPersistence for SnapshotRepo {
    fn save(&self, history: &History) -> Result<(), VfsError> {
        self.in_transaction(|| self.write(history))?;
        debug!(project_id = %self.project_id, len = history.len(), "history saved");
        Ok(())
    }

    fn save_cursor(&self, history: &History) -> Result<(), VfsError> {
        self.write_cursor(history)?;
        debug!(
            project_id = %self.project_id,
            current_index = history.current_index(),
            "history cursor saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<History>, VfsError> {
        let load = |err: rusqlite::Error| VfsError::Load {
            message: err.to_string(),
        };
        let cursor: Option<(i64, i64)> = self
            .conn
            .query_row(
                "SELECT current_index, len FROM history_cursor WHERE project_id = ?1",
                [self.project_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(load)?;
        let Some((current_index, len)) = cursor else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT version, at, message, files_json FROM snapshots WHERE project_id = ?1 ORDER BY version ASC",
            )
            .map_err(load)?;
        let mut rows = stmt.query([self.project_id.as_str()]).map_err(load)?;
        let mut snapshots = Vec::new();
        while let Some(row) = rows.next().map_err(load)? {
            let version: u32 = row.get(0).map_err(load)?;
            let at: String = row.get(1).map_err(load)?;
            let message: String = row.get(2).map_err(load)?;
            let files_json: String = row.get(3).map_err(load)?;
            let files: Vec<ProjectFile> = decode_json(&files_json)?;
            snapshots.push(Snapshot {
                version,
                at: from_rfc3339(&at)?,
                message,
                files: files
                    .into_iter()
                    .map(|file| (file.path.clone(), file))
                    .collect::<BTreeMap<_, _>>(),
            });
        }

        if i64::try_from(snapshots.len()).ok() != Some(len) {
            return Err(VfsError::CorruptHistory {
                message: format!("cursor expects {len} snapshots, found {}", snapshots.len()),
            });
        }
        let current_index = usize::try_from(current_index).map_err(|_| VfsError::CorruptHistory {
            message: format!("negative cursor {current_index}"),
        })?;
        History::from_parts(snapshots, current_index).map(Some)
    }
}
