use crate::util::{decode_enum, decode_json, encode_enum, encode_json, from_rfc3339, to_rfc3339};
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use ulid::Ulid;
use wf_core::error::ForgeError;
use wf_core::events::EventRepository;
use wf_events::types::EventRecord;

pub struct EventRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> EventRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn internal(err: impl std::fmt::Display) -> ForgeError {
    ForgeError::Internal {
        message: err.to_string(),
    }
}

impl<'a> EventRepository for EventRepo<'a> {
    fn append(&self, mut event: EventRecord) -> Result<EventRecord, ForgeError> {
        event.seq = next_seq(self.conn)?;
        event.id = format!("evt_{}", Ulid::new());
        self.conn
            .execute(
                "INSERT INTO events (id, seq, at, topic, correlation_id, source, body_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    event.id,
                    event.seq,
                    to_rfc3339(&event.at),
                    event.topic,
                    event.correlation_id,
                    encode_enum(&event.source).map_err(internal)?,
                    encode_json(&event.body).map_err(internal)?,
                ],
            )
            .map_err(internal)?;
        Ok(event)
    }

    fn list(
        &self,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, ForgeError> {
        list_events(self.conn, None, after, limit)
    }

    fn list_topic(
        &self,
        topic: &str,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, ForgeError> {
        list_events(self.conn, Some(topic), after, limit)
    }
}

fn list_events(
    conn: &Connection,
    topic: Option<&str>,
    after: Option<i64>,
    limit: Option<u32>,
) -> Result<Vec<EventRecord>, ForgeError> {
    let mut sql =
        "SELECT id, seq, at, topic, correlation_id, source, body_json FROM events".to_string();
    let mut clauses = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    if let Some(topic) = topic {
        params.push(SqlValue::Text(topic.to_string()));
        clauses.push(format!("topic = ?{}", params.len()));
    }
    if let Some(after) = after {
        params.push(SqlValue::Integer(after));
        clauses.push(format!("seq > ?{}", params.len()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY seq ASC");
    if let Some(limit) = limit {
        params.push(SqlValue::Integer(i64::from(limit)));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
    }

    let mut stmt = conn.prepare(&sql).map_err(internal)?;
    let mut rows = stmt
        .query(rusqlite::params_from_iter(params))
        .map_err(internal)?;
    let mut events = Vec::new();
    while let Some(row) = rows.next().map_err(internal)? {
        events.push(map_event_row(row)?);
    }
    Ok(events)
}

fn map_event_row(row: &rusqlite::Row<'_>) -> Result<EventRecord, ForgeError> {
    let id: String = row.get(0).map_err(internal)?;
    let seq: i64 = row.get(1).map_err(internal)?;
    let at: String = row.get(2).map_err(internal)?;
    let topic: Option<String> = row.get(3).map_err(internal)?;
    let correlation_id: Option<String> = row.get(4).map_err(internal)?;
    let source: String = row.get(5).map_err(internal)?;
    let body_json: String = row.get(6).map_err(internal)?;

    Ok(EventRecord {
        id,
        seq,
        at: from_rfc3339(&at).map_err(internal)?,
        topic,
        correlation_id,
        source: decode_enum(&source).map_err(internal)?,
        body: decode_json(&body_json).map_err(internal)?,
    })
}

fn next_seq(conn: &Connection) -> Result<i64, ForgeError> {
    let seq: i64 = conn
        .query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| {
            row.get(0)
        })
        .map_err(internal)?;
    Ok(seq + 1)
}
