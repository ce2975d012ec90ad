use rusqlite::Connection;
use wf_core::error::{ForgeError, JobError};
use wf_core::store::Store;

use crate::event_repo::EventRepo;
use crate::job_repo::JobRepo;

pub struct DbStore {
    conn: Connection,
}

impl DbStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn tx_error(err: rusqlite::Error) -> ForgeError {
    ForgeError::Job(JobError::Storage {
        message: err.to_string(),
    })
}

impl Store for DbStore {
    type Jobs<'a>
        = JobRepo<'a>
    where
        Self: 'a;
    type Events<'a>
        = EventRepo<'a>
    where
        Self: 'a;

    fn jobs(&self) -> Self::Jobs<'_> {
        JobRepo::new(&self.conn)
    }

    fn events(&self) -> Self::Events<'_> {
        EventRepo::new(&self.conn)
    }

    fn with_tx<F, T>(&self, f: F) -> Result<T, ForgeError>
    where
        F: FnOnce(&Self) -> Result<T, ForgeError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE").map_err(tx_error)?;
        let result = f(self);
        match result {
            Ok(value) => {
                self.conn.execute_batch("COMMIT").map_err(tx_error)?;
                Ok(value)
            }
            Err(err) => {
                self.conn.execute_batch("ROLLBACK").map_err(tx_error)?;
                Err(err)
            }
        }
    }
}
