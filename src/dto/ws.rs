use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationError;

use crate::{
    dto::mobile::validate_participant_name,
    state::game::{OptionKey, QuestionOptions},
};

#[derive(Debug, Deserialize, Serialize, ToSchema, PartialEq)]
/// Messages accepted from mobile FFF WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FffInboundMessage {
    /// First frame: the participant's display name.
    Identification { name: String },
    /// The participant tapped an option.
    Tap { option: OptionKey },
    #[serde(other)]
    Unknown,
}

/// Error raised when an inbound frame cannot be accepted.
#[derive(Debug, Error)]
pub enum InboundMessageError {
    /// Not JSON or not one of the known message types.
    #[error("unparseable message")]
    Parse(#[from] serde_json::Error),
    /// Parsed but failed validation.
    #[error("invalid message: {0}")]
    Invalid(ValidationError),
}

impl FffInboundMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, InboundMessageError> {
        let message: Self = serde_json::from_str(text)?;
        if let Self::Identification { name } = &message {
            validate_participant_name(name).map_err(InboundMessageError::Invalid)?;
        }
        Ok(message)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
/// Messages pushed to mobile FFF WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FffOutboundMessage {
    /// Identification accepted.
    Registered { name: String },
    /// No round is running.
    Waiting,
    /// A round started; the client should show the options.
    Question {
        question: String,
        options: QuestionOptions,
        seconds: u32,
    },
    /// A tap was added to the ordering.
    Recorded { option: OptionKey, position: usize },
    /// The ordering is complete and was submitted.
    Submitted {
        answer_order: Vec<OptionKey>,
        time: f64,
    },
    /// The round ended before the ordering was complete.
    TimeUp,
    /// A tap or frame was refused.
    Rejected { reason: String },
}
