//! Events and snapshots rendered by the public display.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{
        admin::UserSummary,
        protocol::{MarkResult, PollPercentages, PollTally},
    },
    state::{
        game::{LifelinesUsed, OptionKey, QuestionLevel, QuestionOptions},
        state_machine::GameStatus,
    },
};

/// A question as shown to players: the right answer is never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestionView {
    pub id: u32,
    pub question: String,
    pub options: QuestionOptions,
    pub amount: u64,
    pub milestone: bool,
}

impl From<&QuestionLevel> for QuestionView {
    fn from(level: &QuestionLevel) -> Self {
        Self {
            id: level.id,
            question: level.question.clone(),
            options: level.options.clone(),
            amount: level.amount,
            milestone: level.milestone,
        }
    }
}

/// One rung of the money tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MoneyLevelView {
    pub id: u32,
    pub amount: u64,
    pub milestone: bool,
    /// The level being played or viewed.
    pub current: bool,
    /// Levels strictly below the current one.
    pub passed: bool,
}

/// Money tree with the top prize first, highlighting `current`.
pub fn money_tree(levels: &[QuestionLevel], current: Option<u32>) -> Vec<MoneyLevelView> {
    levels
        .iter()
        .rev()
        .map(|level| MoneyLevelView {
            id: level.id,
            amount: level.amount,
            milestone: level.milestone,
            current: current == Some(level.id),
            passed: current.is_some_and(|current| level.id < current),
        })
        .collect()
}

/// Countdowns shown on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Per-question answer timer.
    Question,
    /// Poll QR invite lifetime.
    Poll,
    /// Fastest-finger-first round.
    Fff,
}

/// `display.question`: a question is on screen.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionShownEvent {
    pub user_id: u32,
    pub user_name: String,
    /// Level being played; differs from `question.id` after a swap.
    pub level_id: u32,
    pub question: QuestionView,
    pub eliminated: Vec<OptionKey>,
    pub disabled: Vec<OptionKey>,
    pub money_tree: Vec<MoneyLevelView>,
    pub seconds: u32,
    /// Set when an already issued question is shown again.
    pub redisplay: bool,
}

/// `display.timer` and `fff.timer`: one second elapsed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimerEvent {
    pub timer: TimerKind,
    pub remaining: u32,
    pub running: bool,
    /// Last seconds of the question timer.
    pub pulse: bool,
}

/// `display.selection`: the player clicked an option.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SelectionEvent {
    pub user_id: u32,
    pub question_id: u32,
    pub option: OptionKey,
}

/// `display.eliminated`: fifty-fifty removed two options.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OptionsEliminatedEvent {
    pub question_id: u32,
    pub eliminated: Vec<OptionKey>,
}

/// `display.answer`: the selection was marked.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerRevealEvent {
    pub question_id: u32,
    pub selected: OptionKey,
    pub correct_answer: OptionKey,
    /// Admin verdict, drives the reveal styling.
    pub marked: MarkResult,
    /// Whether the selection really was right.
    pub correct: bool,
    /// Double dip granted another attempt.
    pub second_chance: bool,
    pub amount_won: u64,
}

/// `display.game_over`: the contestant's game ended.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameOverEvent {
    pub user_id: u32,
    pub status: GameStatus,
    pub title: String,
    pub message: String,
    pub amount: u64,
}

/// `display.poll_invite`: the audience poll QR is up.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollInviteEvent {
    pub question_id: u32,
    pub user_id: u32,
    pub url: String,
    pub expires_in_seconds: u32,
}

/// Why the poll invite went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PollCloseReason {
    /// The invite countdown ran out.
    Expired,
    /// Closed from the display.
    Closed,
    /// Results replaced the invite.
    Results,
}

/// `display.poll_expired` / `display.poll_closed`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollClosedEvent {
    pub reason: PollCloseReason,
    /// Delay before renderers hide the QR modal.
    pub hide_after_ms: u64,
}

/// `display.poll_results`: audience answers with their shares.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollResultsEvent {
    pub votes: PollTally,
    pub percentages: PollPercentages,
    pub total: u32,
}

impl From<PollTally> for PollResultsEvent {
    fn from(votes: PollTally) -> Self {
        Self {
            votes,
            percentages: votes.percentages(),
            total: votes.total(),
        }
    }
}

/// `display.lifelines`: lifeline board of the contestant on screen.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LifelinesEvent {
    pub user_id: u32,
    pub lifelines_used: LifelinesUsed,
    /// Double dip armed on the question on screen.
    pub double_dip_active: bool,
}

/// Severity of a [`NoticeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// `display.notice`: a human-readable status line.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NoticeEvent {
    pub level: NoticeLevel,
    pub message: String,
}

/// Body of `POST /display/select`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SelectOptionRequest {
    pub option: OptionKey,
}

/// Current state of the display, served by `GET /display/state`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DisplaySnapshot {
    pub user: Option<UserSummary>,
    pub question: Option<QuestionView>,
    pub level_id: Option<u32>,
    pub eliminated: Vec<OptionKey>,
    pub disabled: Vec<OptionKey>,
    pub selection: Option<OptionKey>,
    pub resolved: bool,
    pub double_dip_active: bool,
    pub timer_remaining: u32,
    pub timer_running: bool,
    pub poll_open: bool,
    pub money_tree: Vec<MoneyLevelView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::game_engine::tests::bank;

    #[test]
    fn money_tree_lists_top_prize_first() {
        let bank = bank();
        let tree = money_tree(&bank.levels, Some(3));

        assert_eq!(tree.first().map(|level| level.id), Some(6));
        assert_eq!(tree.last().map(|level| level.id), Some(1));
        let current: Vec<u32> = tree.iter().filter(|l| l.current).map(|l| l.id).collect();
        assert_eq!(current, vec![3]);
        let passed: Vec<u32> = tree.iter().filter(|l| l.passed).map(|l| l.id).collect();
        assert_eq!(passed, vec![2, 1]);
    }

    #[test]
    fn question_view_hides_the_answer() {
        let bank = bank();
        let value = serde_json::to_value(QuestionView::from(&bank.levels[0])).unwrap();
        assert!(value.get("correct_answer").is_none());
        assert!(value.get("correctAnswer").is_none());
        assert_eq!(value["options"]["A"], "alpha");
    }
}
