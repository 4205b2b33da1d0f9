//! Mobile poll ballot DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::{
    dto::protocol::PollVote,
    state::game::{OptionKey, QuestionOptions},
};

const MAX_NAME_LEN: usize = 40;

/// Validates a participant label: non-blank and at most 40 characters.
pub fn validate_participant_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("participant_blank");
        err.message = Some("Participant name must not be blank".into());
        return Err(err);
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        let mut err = ValidationError::new("participant_length");
        err.message =
            Some(format!("Participant name must be at most {MAX_NAME_LEN} characters").into());
        return Err(err);
    }
    Ok(())
}

/// Query of `GET /mobile/poll`, as encoded in the poll QR link.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PollBallotQuery {
    pub question_id: Option<u32>,
    pub user_id: Option<u32>,
    #[validate(custom(function = "validate_participant_name"))]
    pub participant: String,
}

/// Question shown on the voter's phone.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollBallotResponse {
    pub question_id: u32,
    pub user_id: Option<u32>,
    pub question: String,
    pub options: QuestionOptions,
    pub expires_in_seconds: u32,
}

/// Body of `POST /mobile/poll/vote`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PollVoteRequest {
    pub question_id: u32,
    #[validate(custom(function = "validate_participant_name"))]
    pub participant: String,
    pub option: OptionKey,
}

/// Vote accepted and published.
#[derive(Debug, Serialize, ToSchema)]
pub struct PollVoteResponse {
    pub vote: PollVote,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_names_must_be_meaningful() {
        assert!(validate_participant_name("Seat 14").is_ok());
        assert!(validate_participant_name("   ").is_err());
        assert!(validate_participant_name(&"x".repeat(41)).is_err());
    }

    #[test]
    fn vote_request_validation_reports_the_field() {
        let request = PollVoteRequest {
            question_id: 3,
            participant: String::new(),
            option: OptionKey::B,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("participant"));
    }
}
