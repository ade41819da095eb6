use crate::AppState;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use zoneweaver_core::TaskEvent;
use zoneweaver_runtime::command::CommandRunner;

/// Query parameters for the task watch stream.
#[derive(Debug, Deserialize, Default)]
pub struct WatchParams {
    /// Set to "true" or "1" to enable watch mode instead of a one-shot list.
    pub watch: Option<String>,
    /// Restrict the stream to a single zone's tasks.
    pub zone_name: Option<String>,
}

impl WatchParams {
    pub fn is_watch(&self) -> bool {
        self.watch.as_deref().is_some_and(|v| v == "true" || v == "1")
    }
}

/// SSE stream of `TaskEvent`s, optionally filtered to a single zone.
pub fn watch_task_stream<R: CommandRunner + Clone + Send + Sync + 'static>(
    state: &Arc<AppState<R>>,
    zone_name: Option<String>,
) -> Sse<impl futures_util::Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.subscribe();
    let stream = BroadcastStream::new(rx);

    let filtered = stream.filter_map(move |result: std::result::Result<TaskEvent, BroadcastStreamRecvError>| {
        let zone_name = zone_name.clone();
        async move {
            let event = result.ok()?;
            if let Some(ref zn) = zone_name {
                if event.zone_name != *zn {
                    return None;
                }
            }
            let data = serde_json::to_string(&event).ok()?;
            Some(Ok(Event::default().event(format!("{:?}", event.kind)).data(data)))
        }
    });

    Sse::new(filtered).keep_alive(KeepAlive::default())
}
