//! Fastest-finger-first DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::game::{OptionKey, QuestionOptions};

/// One ranked participant.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub name: String,
    pub answer_order: Vec<OptionKey>,
    /// Seconds to complete the ordering.
    pub time: f64,
    pub correct: bool,
}

/// Response of `GET /admin/fff/leaderboard` and payload of `fff.leaderboard`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub correct_order: Vec<OptionKey>,
    pub participants: usize,
    pub entries: Vec<LeaderboardEntry>,
}

/// `fff.round_started`: the round is open.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundStartedEvent {
    pub question: String,
    pub options: QuestionOptions,
    pub seconds: u32,
    pub join_url: String,
}

/// `fff.submission`: a participant completed their ordering.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmissionReceivedEvent {
    pub name: String,
    pub participants: usize,
}

/// State of the FFF round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundStatusResponse {
    pub active: bool,
    pub participants: usize,
    pub remaining: u32,
    pub join_url: String,
}
