//! Server-Sent Events for live updates
//!
//! `EventSource` cannot send headers, so the session token comes as a query
//! parameter. Every event belongs to one account and is only delivered to
//! that account's streams; without a valid token only heartbeats are sent.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use echo_common::events::EchoEvent;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub token: Option<String>,
}

fn visible_to(event: &EchoEvent, viewer: Option<Uuid>) -> bool {
    viewer == Some(event.user_id())
}

/// GET /api/events?token=
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let viewer = match query.token.as_deref() {
        Some(token) => match state.auth.get_session(token).await {
            Ok(session) => session.map(|s| s.user_id),
            Err(e) => {
                warn!("SSE: session lookup failed: {}", e);
                None
            }
        },
        None => None,
    };
    info!("New SSE client connected (user: {:?})", viewer);

    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !visible_to(&event, viewer) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: sending {}", event.name());
                            yield Ok(Event::default().event(event.name()).data(json));
                        }
                        Err(e) => warn!("SSE: failed to serialize {}: {}", event.name(), e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use echo_common::events::PlaybackState;

    #[test]
    fn test_visibility() {
        let owner = Uuid::new_v4();
        let inserted = EchoEvent::EchoInserted {
            user_id: owner,
            echo_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        let playback = EchoEvent::PlaybackStateChanged {
            user_id: owner,
            echo_id: None,
            state: PlaybackState::Paused,
            timestamp: Utc::now(),
        };

        assert!(visible_to(&inserted, Some(owner)));
        assert!(!visible_to(&inserted, Some(Uuid::new_v4())));
        assert!(!visible_to(&inserted, None));
        assert!(visible_to(&playback, Some(owner)));
        assert!(!visible_to(&playback, Some(Uuid::new_v4())));
        assert!(!visible_to(&playback, None));
    }
}
