//! Raw access to the broadcast channel for participants living outside the process.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::{
    dto::protocol::{
        AdminMessage, FffMessage, FffSubmission, PollVote, ProgressEcho, ProtocolError,
        SelectionEcho,
    },
    error::ServiceError,
    state::{
        SharedState,
        channel::{ChannelHandle, Topic},
    },
};

/// Latest value stored under `topic`.
pub fn read(state: &SharedState, topic: Topic) -> Result<Value, ServiceError> {
    let raw = state
        .channel()
        .read(topic)
        .ok_or_else(|| ServiceError::NotFound(format!("nothing written under `{topic}` yet")))?;
    serde_json::from_str(&raw).map_err(|err| ServiceError::Internal(err.to_string()))
}

/// Publish `value` under `topic` as a fresh participant, after checking it against the
/// topic's payload schema.
pub fn write(state: &SharedState, topic: Topic, value: Value) -> Result<(), ServiceError> {
    check_payload(topic, &value)?;
    let writer = ChannelHandle::new(state.channel());
    writer.publish(topic, &value)?;
    info!(%topic, origin = %writer.origin(), "external channel write");
    Ok(())
}

/// Reject values that listeners of `topic` could not decode.
pub fn check_payload(topic: Topic, value: &Value) -> Result<(), ProtocolError> {
    match topic {
        Topic::AdminCommand => conforms::<AdminMessage>(topic, value),
        Topic::GameStateUpdate => conforms::<ProgressEcho>(topic, value),
        Topic::AnswerSelected => conforms::<SelectionEcho>(topic, value),
        Topic::PollVote => conforms::<PollVote>(topic, value),
        Topic::FffCommand => conforms::<FffMessage>(topic, value),
        Topic::FffSubmission => conforms::<FffSubmission>(topic, value),
    }
}

fn conforms<T: DeserializeOwned>(topic: Topic, value: &Value) -> Result<(), ProtocolError> {
    T::deserialize(value)
        .map(|_| ())
        .map_err(|source| ProtocolError::Malformed { topic, source })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::tests::shared_state;

    #[test]
    fn payloads_are_checked_against_their_topic() {
        let vote = json!({
            "questionId": 3,
            "option": "B",
            "participant": "Seat 4",
            "timestamp": 1_700_000_000_000_i64
        });
        assert!(check_payload(Topic::PollVote, &vote).is_ok());
        assert!(check_payload(Topic::FffSubmission, &vote).is_err());
        assert!(
            check_payload(
                Topic::AdminCommand,
                &json!({"action": "startTimer", "userId": 1, "timestamp": 1})
            )
            .is_ok()
        );
    }

    #[tokio::test]
    async fn external_writes_are_readable() {
        let state = shared_state();
        let vote = json!({
            "questionId": 1,
            "option": "A",
            "participant": "Seat 9",
            "timestamp": 1
        });
        write(&state, Topic::PollVote, vote.clone()).unwrap();
        assert_eq!(read(&state, Topic::PollVote).unwrap(), vote);
        assert!(matches!(
            read(&state, Topic::FffSubmission),
            Err(ServiceError::NotFound(_))
        ));
    }
}
