//! Server-sent event stream over the in-process broadcaster (spec.md §4.9,
//! §6: "events (streaming)").

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::{stream, Stream};

use printarr_core::events::{Subscription, HEARTBEAT_INTERVAL_SECS};

use crate::server::SharedState;

pub async fn stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.broadcaster.subscribe();

    let stream = stream::unfold(subscription, |mut sub: Subscription| async move {
        let event = sub.recv().await?;
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Some((Ok(SseEvent::default().event(event_name(event.event_type)).data(payload)), sub))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS))
            .text("heartbeat"),
    )
}

fn event_name(event_type: printarr_core::events::EventType) -> &'static str {
    use printarr_core::events::EventType::*;
    match event_type {
        JobCreated => "job_created",
        JobStarted => "job_started",
        JobProgress => "job_progress",
        JobCompleted => "job_completed",
        JobFailed => "job_failed",
        JobCanceled => "job_canceled",
        DesignStatusChanged => "design_status_changed",
        DesignCreated => "design_created",
        QueueUpdated => "queue_updated",
        SyncStatus => "sync_status",
        SettingsChanged => "settings_changed",
        Heartbeat => "heartbeat",
    }
}
