use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dao::models::{FffQuestionEntity, QuestionEntity, UserEntity},
    state::state_machine::GameStatus,
};

/// One of the four answer slots of a question.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum OptionKey {
    /// First option.
    A,
    /// Second option.
    B,
    /// Third option.
    C,
    /// Fourth option.
    D,
}

impl OptionKey {
    /// Every option key in display order.
    pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

    /// Single-letter label used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            OptionKey::A => "A",
            OptionKey::B => "B",
            OptionKey::C => "C",
            OptionKey::D => "D",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "A" | "a" => Ok(OptionKey::A),
            "B" | "b" => Ok(OptionKey::B),
            "C" | "c" => Ok(OptionKey::C),
            "D" | "d" => Ok(OptionKey::D),
            other => Err(format!("unknown option `{other}`")),
        }
    }
}

/// Texts of the four options keyed by their letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestionOptions {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
}

impl QuestionOptions {
    /// Text of the option behind `key`.
    pub fn get(&self, key: OptionKey) -> &str {
        match key {
            OptionKey::A => &self.a,
            OptionKey::B => &self.b,
            OptionKey::C => &self.c,
            OptionKey::D => &self.d,
        }
    }
}

/// A question of the money ladder. The level id doubles as its difficulty rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionLevel {
    /// Unique identifier, 1..N.
    pub id: u32,
    /// Question text.
    pub question: String,
    /// Option texts.
    pub options: QuestionOptions,
    /// Key of the right answer.
    pub correct_answer: OptionKey,
    /// Prize attached to the level.
    pub amount: u64,
    /// Safe-haven checkpoint flag.
    pub milestone: bool,
    /// Set once the question has been swapped away during this session.
    pub swapped: bool,
}

/// The four single-use helps a contestant can call on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Lifeline {
    /// Remove two wrong options.
    FiftyFifty,
    /// Replace the current question with an unasked harder one.
    SwapQuestion,
    /// Ask the audience through the mobile poll.
    AudiencePoll,
    /// Allow a second answer after a first wrong one.
    DoubleDip,
}

impl Lifeline {
    /// Every lifeline in money-board order.
    pub const ALL: [Lifeline; 4] = [
        Lifeline::FiftyFifty,
        Lifeline::SwapQuestion,
        Lifeline::AudiencePoll,
        Lifeline::DoubleDip,
    ];

    /// Camel-case name used in paths and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Lifeline::FiftyFifty => "fiftyFifty",
            Lifeline::SwapQuestion => "swapQuestion",
            Lifeline::AudiencePoll => "audiencePoll",
            Lifeline::DoubleDip => "doubleDip",
        }
    }
}

impl fmt::Display for Lifeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifeline {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Lifeline::ALL
            .into_iter()
            .find(|lifeline| lifeline.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown lifeline `{value}`"))
    }
}

/// Usage flags for every lifeline. A flag only ever goes from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LifelinesUsed {
    pub fifty_fifty: bool,
    pub swap_question: bool,
    pub audience_poll: bool,
    pub double_dip: bool,
}

impl LifelinesUsed {
    /// Whether `lifeline` was already consumed.
    pub fn is_used(&self, lifeline: Lifeline) -> bool {
        match lifeline {
            Lifeline::FiftyFifty => self.fifty_fifty,
            Lifeline::SwapQuestion => self.swap_question,
            Lifeline::AudiencePoll => self.audience_poll,
            Lifeline::DoubleDip => self.double_dip,
        }
    }

    /// Consume `lifeline`, returning `false` when it had already been used.
    pub fn mark_used(&mut self, lifeline: Lifeline) -> bool {
        let flag = match lifeline {
            Lifeline::FiftyFifty => &mut self.fifty_fifty,
            Lifeline::SwapQuestion => &mut self.swap_question,
            Lifeline::AudiencePoll => &mut self.audience_poll,
            Lifeline::DoubleDip => &mut self.double_dip,
        };
        !std::mem::replace(flag, true)
    }
}

/// Progress of one registered contestant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    /// Level the contestant is currently playing.
    #[serde(alias = "currentQuestionIndex", default)]
    pub current_question_level_id: u32,
    /// Question ids issued to this contestant, in order.
    #[serde(default)]
    pub questions_attempted: Vec<u32>,
    /// Prize secured so far.
    #[serde(default)]
    pub amount_won: u64,
    /// Lifecycle status.
    #[serde(default)]
    pub game_status: GameStatus,
    /// Lifeline usage flags.
    #[serde(default)]
    pub lifelines_used: LifelinesUsed,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            current_question_level_id: 0,
            questions_attempted: Vec::new(),
            amount_won: 0,
            game_status: GameStatus::Ready,
            lifelines_used: LifelinesUsed::default(),
        }
    }
}

/// Registered contestant with their progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Fixture identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Mutable progress.
    pub progress: UserProgress,
}

/// Fastest-finger-first ordering question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FffQuestion {
    /// Question text.
    pub question: String,
    /// Option texts.
    pub options: QuestionOptions,
    /// The canonical ordering of the four keys.
    pub correct_order: Vec<OptionKey>,
}

/// Every question known to the session, levels sorted by id.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    /// Money-ladder levels, ascending id.
    pub levels: Vec<QuestionLevel>,
    /// Optional FFF question.
    pub fff_question: Option<FffQuestion>,
}

impl QuestionBank {
    /// Build a bank, sorting levels by id.
    pub fn new(mut levels: Vec<QuestionLevel>, fff_question: Option<FffQuestion>) -> Self {
        levels.sort_by_key(|level| level.id);
        Self {
            levels,
            fff_question,
        }
    }

    /// Look a level up by id.
    pub fn level(&self, id: u32) -> Option<&QuestionLevel> {
        self.levels.iter().find(|level| level.id == id)
    }
}

impl From<QuestionEntity> for QuestionLevel {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value.options,
            correct_answer: value.correct_answer,
            amount: value.amount,
            milestone: value.milestone,
            swapped: false,
        }
    }
}

impl From<FffQuestionEntity> for FffQuestion {
    fn from(value: FffQuestionEntity) -> Self {
        Self {
            question: value.question,
            options: value.options,
            correct_order: value.correct_order,
        }
    }
}

impl From<UserEntity> for User {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            progress: value.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifeline_can_only_be_consumed_once() {
        let mut used = LifelinesUsed::default();
        assert!(used.mark_used(Lifeline::DoubleDip));
        assert!(!used.mark_used(Lifeline::DoubleDip));
        assert!(used.is_used(Lifeline::DoubleDip));
        assert!(!used.is_used(Lifeline::FiftyFifty));
    }

    #[test]
    fn progress_accepts_legacy_index_field() {
        let progress: UserProgress = serde_json::from_str(
            r#"{"currentQuestionIndex":3,"questionsAttempted":[1,2,3],"amountWon":2000,"gameStatus":"active","lifelinesUsed":{"fiftyFifty":true}}"#,
        )
        .unwrap();

        assert_eq!(progress.current_question_level_id, 3);
        assert_eq!(progress.game_status, GameStatus::Active);
        assert!(progress.lifelines_used.fifty_fifty);
        assert!(!progress.lifelines_used.swap_question);
    }

    #[test]
    fn parses_lifeline_names_from_paths() {
        assert_eq!("swapQuestion".parse::<Lifeline>(), Ok(Lifeline::SwapQuestion));
        assert_eq!("doubledip".parse::<Lifeline>(), Ok(Lifeline::DoubleDip));
        assert!("phoneAFriend".parse::<Lifeline>().is_err());
    }
}
