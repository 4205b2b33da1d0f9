//! Server-sent event hubs: the studio feed watched by the display and FFF screens, and
//! the admin desk.

use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::{config::AppConfig, dto::sse::ServerEvent};

/// SSE sub-state of [`AppState`](super::AppState).
pub struct SseState {
    studio: SseHub,
    admin: AdminDesk,
}

impl SseState {
    /// Both hubs buffer `config.sse_capacity` events per subscriber.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            studio: SseHub::new(config.sse_capacity),
            admin: AdminDesk::new(config.sse_capacity),
        }
    }

    /// Hub feeding `/sse/public`.
    pub fn studio(&self) -> &SseHub {
        &self.studio
    }

    /// Admin hub and its lease.
    pub fn admin(&self) -> &AdminDesk {
        &self.admin
    }
}

/// Admin hub plus the lease that keeps a single admin screen streaming.
pub struct AdminDesk {
    hub: SseHub,
    lease: Mutex<Option<String>>,
}

impl AdminDesk {
    fn new(capacity: usize) -> Self {
        Self {
            hub: SseHub::new(capacity),
            lease: Mutex::new(None),
        }
    }

    /// Hub feeding `/sse/admin`.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    /// Hand out a fresh lease token, or `None` while another admin screen holds one.
    pub async fn claim(&self) -> Option<String> {
        let mut lease = self.lease.lock().await;
        if lease.is_some() {
            return None;
        }
        let token = Uuid::new_v4().simple().to_string();
        *lease = Some(token.clone());
        Some(token)
    }

    /// Give the lease back. A token from an earlier connection releases nothing.
    pub async fn release(&self, token: &str) -> bool {
        let mut lease = self.lease.lock().await;
        if lease.as_deref() != Some(token) {
            return false;
        }
        *lease = None;
        true
    }
}

/// Fan-out of named JSON events to every connected screen.
#[derive(Clone)]
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Hub whose subscribers may lag by at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an already encoded event. Nobody listening is not an error.
    pub fn broadcast(&self, event: ServerEvent) {
        if let Err(unsent) = self.sender.send(event) {
            trace!(event = ?unsent.0.event, "no SSE subscriber");
        }
    }

    /// Encode `payload` as the `name` event and send it.
    pub fn emit(&self, name: &str, payload: &impl Serialize) {
        match ServerEvent::json(Some(name.to_string()), payload) {
            Ok(event) => self.broadcast(event),
            Err(err) => warn!(event = name, error = %err, "failed to serialize SSE payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admin_lease_is_exclusive() {
        let desk = AdminDesk::new(4);
        let token = desk.claim().await.unwrap();
        assert_eq!(token.len(), 32);
        assert!(desk.claim().await.is_none());

        assert!(!desk.release("stale").await);
        assert!(desk.claim().await.is_none());

        assert!(desk.release(&token).await);
        assert!(desk.claim().await.is_some());
    }

    #[tokio::test]
    async fn emitted_events_carry_name_and_json() {
        let state = SseState::new(&AppConfig::default());
        let mut receiver = state.studio().subscribe();
        state.studio().emit("display.notice", &serde_json::json!({ "message": "hi" }));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("display.notice"));
        assert_eq!(event.data, r#"{"message":"hi"}"#);
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        SseHub::new(1).emit("fff.reset", &serde_json::json!({}));
    }
}
