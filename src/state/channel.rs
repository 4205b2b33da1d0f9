//! In-process stand-in for the cross-tab key-value broadcast channel.
//!
//! Every write stores the latest value for its topic and fans the message out to all
//! observers except the writer, mirroring the browser `storage` event.

use std::{fmt, str::FromStr, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::protocol::ProtocolError;

/// Identifier of the participant that wrote a message.
pub type OriginId = Uuid;

/// Keys of the broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Topic {
    /// Admin to display commands.
    #[serde(rename = "kbcAdminCommand")]
    AdminCommand,
    /// Display to admin progress echo.
    #[serde(rename = "kbcGameStateUpdate")]
    GameStateUpdate,
    /// Display to admin option selection echo.
    #[serde(rename = "kbcAnswerSelected")]
    AnswerSelected,
    /// Mobile to admin poll votes.
    #[serde(rename = "kbcPollVote")]
    PollVote,
    /// FFF admin to mobile round commands.
    #[serde(rename = "kbcFFFCommand")]
    FffCommand,
    /// Mobile to FFF admin submissions.
    #[serde(rename = "kbcFFFSubmission")]
    FffSubmission,
}

impl Topic {
    /// Every topic of the protocol.
    pub const ALL: [Topic; 6] = [
        Topic::AdminCommand,
        Topic::GameStateUpdate,
        Topic::AnswerSelected,
        Topic::PollVote,
        Topic::FffCommand,
        Topic::FffSubmission,
    ];

    /// Storage key of the topic.
    pub fn key(self) -> &'static str {
        match self {
            Topic::AdminCommand => "kbcAdminCommand",
            Topic::GameStateUpdate => "kbcGameStateUpdate",
            Topic::AnswerSelected => "kbcAnswerSelected",
            Topic::PollVote => "kbcPollVote",
            Topic::FffCommand => "kbcFFFCommand",
            Topic::FffSubmission => "kbcFFFSubmission",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.key() == value)
            .ok_or_else(|| format!("unknown topic `{value}`"))
    }
}

/// A single write observed on the channel.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Key that was written.
    pub topic: Topic,
    /// Writer of the value.
    pub origin: OriginId,
    /// Raw JSON value.
    pub payload: String,
}

/// Per-key latest-wins pub/sub transport.
pub trait BroadcastChannel: Send + Sync {
    /// Store `payload` under `topic` and notify observers. Returns `false` when the value
    /// was identical to the stored one and nothing was sent.
    fn write(&self, origin: OriginId, topic: Topic, payload: String) -> bool;

    /// Latest value stored under `topic`.
    fn read(&self, topic: Topic) -> Option<String>;

    /// Observe every subsequent write, including the observer's own.
    fn watch(&self) -> broadcast::Receiver<ChannelMessage>;
}

/// Channel living inside the process, backed by a Tokio broadcast channel.
pub struct LocalChannel {
    values: DashMap<Topic, String>,
    sender: broadcast::Sender<ChannelMessage>,
}

impl LocalChannel {
    /// Create a channel whose observers may lag by at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            values: DashMap::new(),
            sender,
        }
    }
}

impl BroadcastChannel for LocalChannel {
    fn write(&self, origin: OriginId, topic: Topic, payload: String) -> bool {
        if let Some(previous) = self.values.get(&topic)
            && *previous == payload
        {
            return false;
        }

        self.values.insert(topic, payload.clone());
        let _ = self.sender.send(ChannelMessage {
            topic,
            origin,
            payload,
        });
        true
    }

    fn read(&self, topic: Topic) -> Option<String> {
        self.values.get(&topic).map(|value| value.clone())
    }

    fn watch(&self) -> broadcast::Receiver<ChannelMessage> {
        self.sender.subscribe()
    }
}

/// A participant's view of the channel. Writes are stamped with the handle's origin.
#[derive(Clone)]
pub struct ChannelHandle {
    origin: OriginId,
    channel: Arc<dyn BroadcastChannel>,
}

impl ChannelHandle {
    /// Join the channel as a new participant.
    pub fn new(channel: Arc<dyn BroadcastChannel>) -> Self {
        Self {
            origin: Uuid::new_v4(),
            channel,
        }
    }

    /// Origin stamped on this participant's writes.
    pub fn origin(&self) -> OriginId {
        self.origin
    }

    /// Serialize and publish `payload` under `topic`.
    pub fn publish<T: Serialize>(&self, topic: Topic, payload: &T) -> Result<(), ProtocolError> {
        let payload = serde_json::to_string(payload)
            .map_err(|source| ProtocolError::Serialize { topic, source })?;
        self.channel.write(self.origin, topic, payload);
        Ok(())
    }

    /// Latest raw value stored under `topic`.
    pub fn latest(&self, topic: Topic) -> Option<String> {
        self.channel.read(topic)
    }

    /// Start observing writes made by other participants.
    pub fn subscribe(&self) -> ChannelSubscription {
        ChannelSubscription {
            origin: self.origin,
            receiver: self.channel.watch(),
        }
    }
}

/// Stream of writes made by everyone but the subscribing participant.
pub struct ChannelSubscription {
    origin: OriginId,
    receiver: broadcast::Receiver<ChannelMessage>,
}

impl ChannelSubscription {
    /// Wait for the next foreign write. Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.origin == self.origin => continue,
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "channel observer lagged; messages dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> Arc<dyn BroadcastChannel> {
        Arc::new(LocalChannel::new(16))
    }

    #[tokio::test]
    async fn writers_do_not_observe_their_own_writes() {
        let channel = channel();
        let admin = ChannelHandle::new(channel.clone());
        let display = ChannelHandle::new(channel);
        let mut admin_sub = admin.subscribe();
        let mut display_sub = display.subscribe();

        admin.publish(Topic::AdminCommand, &"one").unwrap();
        display.publish(Topic::GameStateUpdate, &"two").unwrap();

        let seen_by_display = display_sub.recv().await.unwrap();
        assert_eq!(seen_by_display.topic, Topic::AdminCommand);
        assert_eq!(seen_by_display.origin, admin.origin());

        let seen_by_admin = admin_sub.recv().await.unwrap();
        assert_eq!(seen_by_admin.topic, Topic::GameStateUpdate);
        assert_eq!(seen_by_admin.payload, "\"two\"");
    }

    #[test]
    fn latest_value_wins_per_key() {
        let channel = channel();
        let handle = ChannelHandle::new(channel);
        handle.publish(Topic::PollVote, &1).unwrap();
        handle.publish(Topic::PollVote, &2).unwrap();
        handle.publish(Topic::FffCommand, &3).unwrap();

        assert_eq!(handle.latest(Topic::PollVote).as_deref(), Some("2"));
        assert_eq!(handle.latest(Topic::FffCommand).as_deref(), Some("3"));
        assert_eq!(handle.latest(Topic::AdminCommand), None);
    }

    #[test]
    fn identical_rewrite_does_not_notify() {
        let channel = LocalChannel::new(4);
        let origin = Uuid::new_v4();
        let mut receiver = channel.watch();

        assert!(channel.write(origin, Topic::PollVote, "x".into()));
        assert!(!channel.write(origin, Topic::PollVote, "x".into()));
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn lagging_observer_skips_and_keeps_going() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(2));
        let writer = ChannelHandle::new(channel.clone());
        let reader = ChannelHandle::new(channel);
        let mut sub = reader.subscribe();

        for value in 0..5 {
            writer.publish(Topic::PollVote, &value).unwrap();
        }

        let first = sub.recv().await.unwrap();
        assert_eq!(first.payload, "3");
        assert_eq!(sub.recv().await.unwrap().payload, "4");
    }

    #[test]
    fn topics_round_trip_through_their_keys() {
        for topic in Topic::ALL {
            assert_eq!(topic.key().parse::<Topic>(), Ok(topic));
        }
        assert!("kbcUnknown".parse::<Topic>().is_err());
    }
}
