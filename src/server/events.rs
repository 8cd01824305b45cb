//! SSE bridge for the one-way notifications.
//!
//! The controller and coordinator publish on broadcast channels; this module
//! merges both into a single server-sent-event stream the UI subscribes to.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::chat::coordinator::ChatEvent;
use crate::model::controller::LoadProgress;

/// Merge the load-progress and generation channels into one SSE stream.
///
/// Event names match the notification surface the UI listens on:
/// `loading-progress`, `generation-start`, `generation-complete`,
/// `generation-error`. The notifications are advisory; a receiver that lags
/// behind simply misses some.
pub fn notification_stream(
    progress_rx: broadcast::Receiver<LoadProgress>,
    chat_rx: broadcast::Receiver<ChatEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let progress = BroadcastStream::new(progress_rx).filter_map(|item| async move {
        let progress = item.ok()?;
        Event::default()
            .event("loading-progress")
            .json_data(&progress)
            .ok()
    });

    let chat = BroadcastStream::new(chat_rx).filter_map(|item| async move {
        match item.ok()? {
            ChatEvent::GenerationStart => {
                Some(Event::default().event("generation-start").data("{}"))
            }
            ChatEvent::GenerationComplete(stats) => Event::default()
                .event("generation-complete")
                .json_data(&stats)
                .ok(),
            ChatEvent::GenerationError(message) => Event::default()
                .event("generation-error")
                .json_data(serde_json::json!({ "error": message }))
                .ok(),
        }
    });

    futures::stream::select(progress, chat).map(Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::stats::ChatStats;

    #[tokio::test]
    async fn test_merged_stream_forwards_notifications() {
        let (progress_tx, progress_rx) = broadcast::channel(16);
        let (chat_tx, chat_rx) = broadcast::channel(16);

        progress_tx
            .send(LoadProgress {
                stage: "Initializing engine",
                progress: 0,
            })
            .unwrap();
        chat_tx.send(ChatEvent::GenerationStart).unwrap();
        chat_tx
            .send(ChatEvent::GenerationComplete(ChatStats::new(1, 2, 100)))
            .unwrap();

        // Closing both channels ends the stream.
        drop(progress_tx);
        drop(chat_tx);

        let events: Vec<_> = notification_stream(progress_rx, chat_rx).collect().await;
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.is_ok()));
    }
}
