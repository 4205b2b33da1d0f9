use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::{
    dto::sse::{AdminHandshake, ChannelEvent, Handshake, ServerEvent},
    error::ServiceError,
    state::{SharedState, SseHub, channel::ChannelMessage},
};

const CHANNEL_EVENT: &str = "channel";

/// Subscribe to the shared public SSE stream.
pub fn subscribe_public(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.public_sse().subscribe()
}

/// Subscribe to the admin-only SSE stream.
pub async fn subscribe_admin(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, String), ServiceError> {
    let token = state.admin_desk().claim().await.ok_or_else(|| {
        ServiceError::Unauthorized("Another admin SSE stream is already active".into())
    })?;
    let receiver = state.admin_sse().subscribe();
    Ok((receiver, token))
}

/// Observe every write on the broadcast channel, whoever the writer is.
pub fn subscribe_channel(state: &SharedState) -> broadcast::Receiver<ChannelMessage> {
    state.channel().watch()
}

/// Identifies the target SSE stream so we can perform stream-specific
/// bookkeeping when the connection is torn down.
#[derive(Clone)]
pub enum StreamKind {
    Public,
    /// Raw channel mirror.
    Channel,
    /// Admin mirror holding the desk lease `token` until it disconnects.
    Admin(SharedState, String),
}

/// Convert a hub receiver into an SSE response.
pub fn to_sse_stream(
    receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    forward(receiver, kind, Some)
}

/// Convert a raw channel receiver into an SSE response of `channel` events.
pub fn to_channel_stream(
    receiver: broadcast::Receiver<ChannelMessage>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    forward(receiver, StreamKind::Channel, |message| {
        match ServerEvent::json(
            Some(CHANNEL_EVENT.to_string()),
            &ChannelEvent::from(message),
        ) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(error = %err, "failed to encode channel event");
                None
            }
        }
    })
}

/// Forward a broadcast receiver into an SSE response, cleaning up once the client
/// disconnects.
fn forward<T, F>(
    mut receiver: broadcast::Receiver<T>,
    kind: StreamKind,
    encode: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Option<ServerEvent> + Send + 'static,
{
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(item) => {
                            let Some(payload) = encode(item) else { continue };
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        match kind {
            StreamKind::Public => tracing::info!("Public SSE stream disconnected"),
            StreamKind::Channel => tracing::info!("Channel SSE stream disconnected"),
            StreamKind::Admin(state, token) => {
                state.admin_desk().release(&token).await;
                tracing::info!("Admin SSE stream disconnected")
            }
        }
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Broadcast a token refresh event to the admin stream.
pub fn broadcast_admin_handshake(hub: &SseHub, token: &str) {
    hub.emit(
        "admin_token",
        &AdminHandshake {
            token: token.to_string(),
        },
    );
}

/// Announce a new subscriber on a stream, flagging degraded mode.
pub fn broadcast_handshake(hub: &SseHub, stream: &str, degraded: bool) {
    let handshake = Handshake {
        stream: stream.to_string(),
        message: format!("{stream} stream connected"),
        degraded,
    };
    hub.emit("info", &handshake);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::shared_state;

    #[tokio::test]
    async fn only_one_admin_stream_at_a_time() {
        let state = shared_state();
        let (_receiver, token) = subscribe_admin(&state).await.unwrap();
        assert_eq!(token.len(), 32);
        assert!(matches!(
            subscribe_admin(&state).await,
            Err(ServiceError::Unauthorized(_))
        ));

        assert!(state.admin_desk().release(&token).await);
        assert!(subscribe_admin(&state).await.is_ok());
    }

    #[tokio::test]
    async fn handshake_reports_degraded_mode() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        broadcast_handshake(&hub, "public", true);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("info"));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["stream"], "public");
        assert_eq!(body["degraded"], true);
    }
}
