use crate::routes::error::map_error;
use crate::{AppState, build_forge};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use wf_core::types::JobId;

/// Streams stored events after `after`, then live ones. With a topic, both are scoped to it.
pub async fn subscribe(state: AppState, after: Option<i64>, topic: Option<String>) -> Response {
    let live = BroadcastStream::new(state.event_bus.subscribe());
    let forge = match build_forge(&state) {
        Ok(forge) => forge,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let stored = match topic.as_deref() {
        Some(topic) => match topic.parse::<JobId>() {
            Ok(job_id) => forge.events().for_job(&job_id, after, None),
            Err(err) => Err(crate::routes::error::invalid_input(err)),
        },
        None => forge.events().list(after, None),
    };
    let history = match stored {
        Ok(events) => events,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let last_seq = history.last().map(|event| event.seq).or(after);
    debug!(topic = ?topic, replayed = history.len(), "sse subscriber attached");

    let history_stream = stream::iter(history.into_iter().map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, std::convert::Infallible>(
            Event::default().id(event.seq.to_string()).data(json),
        )
    }));

    // Subscribed before the history read; records already replayed are skipped by seq.
    let live_stream = live.filter_map(move |item| {
        let topic = topic.clone();
        async move {
            let record = item.ok()?;
            if topic.as_deref().is_some_and(|topic| !record.is_topic(topic)) {
                return None;
            }
            if last_seq.is_some_and(|seq| record.seq <= seq) {
                return None;
            }
            let event = wf_core::forge::decode_event(record).ok()?;
            let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(Event::default().id(event.seq.to_string()).data(json)))
        }
    });

    let stream = history_stream.chain(live_stream);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
