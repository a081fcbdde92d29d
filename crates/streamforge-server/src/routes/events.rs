//! Server-Sent Events (SSE) handler.
//!
//! Subscribes to the [`streamforge_core::events::EventBus`], optionally
//! filters by category, replays recent lifecycle events for late joiners,
//! and sends heartbeats.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;
use uuid::Uuid;

use streamforge_core::events::EventCategory;

use crate::context::AppContext;

const REPLAY: usize = 50;
const HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// "lifecycle" or "progress"; anything else means no filter.
    pub category: Option<String>,
}

fn parse_filter(raw: Option<&str>) -> Option<EventCategory> {
    match raw? {
        "lifecycle" => Some(EventCategory::Lifecycle),
        "progress" => Some(EventCategory::Progress),
        _ => None,
    }
}

/// Live events already sent during replay are skipped once.
fn first_delivery(replayed: &mut HashSet<Uuid>, id: Uuid) -> bool {
    replayed.is_empty() || !replayed.remove(&id)
}

/// GET /api/events -- SSE stream of stream lifecycle and progress events.
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let filter = parse_filter(params.category.as_deref());
    let wanted = move |category: EventCategory| filter.map_or(true, |f| f == category);

    let (recent, mut rx) = ctx.event_bus.subscribe_with_replay(REPLAY);
    let mut replayed: HashSet<Uuid> = recent.iter().map(|e| e.id).collect();

    let stream = async_stream::stream! {
        // Oldest first.
        for event in recent.into_iter().rev() {
            if wanted(event.category) {
                if let Ok(data) = serde_json::to_string(&event) {
                    yield Ok(Event::default().event("stream").data(data));
                }
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if first_delivery(&mut replayed, event.id) && wanted(event.category) {
                                if let Ok(data) = serde_json::to_string(&event) {
                                    yield Ok(Event::default().event("stream").data(data));
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parsing() {
        assert_eq!(parse_filter(Some("lifecycle")), Some(EventCategory::Lifecycle));
        assert_eq!(parse_filter(Some("progress")), Some(EventCategory::Progress));
        assert_eq!(parse_filter(Some("other")), None);
        assert_eq!(parse_filter(None), None);
    }

    #[test]
    fn replayed_events_are_not_sent_twice() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut replayed: HashSet<Uuid> = [a].into_iter().collect();
        assert!(!first_delivery(&mut replayed, a));
        assert!(first_delivery(&mut replayed, b));
        assert!(first_delivery(&mut replayed, a));
    }
}
