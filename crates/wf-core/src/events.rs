use crate::error::ForgeError;
use wf_events::types::EventRecord;

pub trait EventRepository {
    fn append(&self, event: EventRecord) -> Result<EventRecord, ForgeError>;
    fn list(&self, after: Option<i64>, limit: Option<u32>)
    -> Result<Vec<EventRecord>, ForgeError>;
    fn list_topic(
        &self,
        topic: &str,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, ForgeError>;
}
