use serde::{Deserialize, Serialize};

use crate::state::game::{OptionKey, QuestionOptions, UserProgress};

/// Top-level document of the questions fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsFileEntity {
    /// Money-ladder levels, in any order.
    pub questions: Vec<QuestionEntity>,
    /// Question used for the fastest-finger-first round.
    #[serde(default)]
    pub fff_question: Option<FffQuestionEntity>,
}

/// Money-ladder level as stored in the fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEntity {
    /// Level identifier, also the difficulty rank.
    pub id: u32,
    /// Question text.
    pub question: String,
    /// Option texts keyed by letter.
    pub options: QuestionOptions,
    /// Key of the right answer.
    pub correct_answer: OptionKey,
    /// Prize for the level.
    pub amount: u64,
    /// Safe-haven flag.
    #[serde(default)]
    pub milestone: bool,
}

/// Ordering question of the fastest-finger-first round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FffQuestionEntity {
    /// Question text.
    pub question: String,
    /// Option texts keyed by letter.
    pub options: QuestionOptions,
    /// Canonical ordering of the four keys.
    pub correct_order: Vec<OptionKey>,
}

/// Registered contestant as stored in the users fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Stable identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Persisted progress; a missing object means a fresh contestant.
    #[serde(default)]
    pub progress: UserProgress,
}
