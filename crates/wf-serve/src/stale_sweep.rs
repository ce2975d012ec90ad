use crate::{AppState, build_forge};
use chrono::Utc;
use tracing::{info, warn};
use wf_core::RequestContext;
use wf_events::types::EventSource;

/// Times out stale jobs on the configured poll interval, independent of any open UI.
pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(state.config.poll_interval());
    loop {
        interval.tick().await;
        let forge = match build_forge(&state) {
            Ok(forge) => forge,
            Err(err) => {
                warn!(error = %err, "stale sweep could not open store");
                continue;
            }
        };
        let ctx = RequestContext::new(EventSource::Reconciler, None);
        match forge.jobs().sweep_stale(&ctx, Utc::now()) {
            Ok(timed_out) if !timed_out.is_empty() => {
                info!(count = timed_out.len(), "stale jobs timed out");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "stale sweep failed"),
        }
    }
}
