//! DTO definitions used by the admin REST API and documentation layer.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::protocol::{AdminMessage, MarkResult, PollPercentages, PollTally, SelectionEcho},
    state::game::{OptionKey, QuestionLevel, QuestionOptions, User, UserProgress},
};

/// Contestant as mirrored by the admin screen.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: u32,
    pub name: String,
    pub progress: UserProgress,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            progress: user.progress.clone(),
        }
    }
}

/// Response listing every registered contestant.
#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
    pub selected_user_id: Option<u32>,
}

/// Full question as seen by the admin, answer included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminQuestionView {
    pub id: u32,
    pub question: String,
    pub options: QuestionOptions,
    pub correct_answer: OptionKey,
    pub amount: u64,
    pub milestone: bool,
    /// Already issued to someone in this session.
    pub asked: bool,
}

impl AdminQuestionView {
    /// Project `level`, flagging whether it was already asked.
    pub fn new(level: &QuestionLevel, asked: bool) -> Self {
        Self {
            id: level.id,
            question: level.question.clone(),
            options: level.options.clone(),
            correct_answer: level.correct_answer,
            amount: level.amount,
            milestone: level.milestone,
            asked,
        }
    }
}

/// Body of `POST /admin/game/mark`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct MarkAnswerRequest {
    pub result: MarkResult,
}

/// Acknowledgement returned once a command was written on the channel.
#[derive(Debug, Serialize, ToSchema)]
pub struct CommandAccepted {
    pub action: String,
    pub user_id: Option<u32>,
    pub timestamp: i64,
}

impl From<&AdminMessage> for CommandAccepted {
    fn from(message: &AdminMessage) -> Self {
        Self {
            action: message.command.action().to_string(),
            user_id: message.user_id,
            timestamp: message.timestamp,
        }
    }
}

/// Tally of the audience poll tracked by the admin.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollTallyResponse {
    /// Question votes are counted for.
    pub question_id: Option<u32>,
    pub votes: PollTally,
    pub percentages: PollPercentages,
    pub total: u32,
}

/// `admin.user_updated`: a progress echo changed the mirror.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserUpdatedEvent {
    pub user: UserSummary,
    pub selected: bool,
    pub current_question_id: Option<u32>,
    pub asked_question_ids: Vec<u32>,
}

/// `admin.selection`: the player clicked an option.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SelectionUpdatedEvent {
    pub selection: SelectionEcho,
}

/// `admin.question_viewed`: the admin switched the question under review.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionViewedEvent {
    pub question: AdminQuestionView,
}

/// `admin.notice`: status line for the operator.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminNoticeEvent {
    pub message: String,
}
