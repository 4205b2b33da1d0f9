use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle status of a contestant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Registered, no question issued yet.
    #[default]
    Ready,
    /// Playing the money ladder.
    Active,
    /// Every level was answered or no question was left.
    Won,
    /// Lost on a wrong answer or a timeout.
    #[serde(rename = "gameover")]
    GameOver,
    /// Walked away with the last passed level's prize.
    Quit,
}

impl GameStatus {
    /// Terminal statuses accept no further progress event.
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Won | GameStatus::GameOver | GameStatus::Quit)
    }

    /// Compute the status reached by applying `event`, if the transition is valid.
    pub fn transition(self, event: ProgressEvent) -> Result<GameStatus, InvalidTransition> {
        let next = match (self, event) {
            (GameStatus::Ready | GameStatus::Active, ProgressEvent::QuestionLoaded) => {
                GameStatus::Active
            }
            (GameStatus::Active, ProgressEvent::AnsweredCorrectly) => GameStatus::Active,
            (GameStatus::Ready | GameStatus::Active, ProgressEvent::Exhausted) => GameStatus::Won,
            (GameStatus::Active, ProgressEvent::AnsweredIncorrectly) => GameStatus::GameOver,
            (GameStatus::Active, ProgressEvent::Quit) => GameStatus::Quit,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

/// Events that move a contestant through their lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A question was issued.
    QuestionLoaded,
    /// The displayed question was answered correctly.
    AnsweredCorrectly,
    /// Wrong answer or timeout without a second chance.
    AnsweredIncorrectly,
    /// No unasked question is left at or above the next level.
    Exhausted,
    /// The contestant walked away.
    Quit,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the contestant was in when the invalid event was received.
    pub from: GameStatus,
    /// The event that cannot be applied from this status.
    pub event: ProgressEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(status: GameStatus, event: ProgressEvent) -> GameStatus {
        status.transition(event).unwrap()
    }

    #[test]
    fn initial_status_is_ready() {
        assert_eq!(GameStatus::default(), GameStatus::Ready);
    }

    #[test]
    fn full_happy_path_to_won() {
        let status = apply(GameStatus::Ready, ProgressEvent::QuestionLoaded);
        assert_eq!(status, GameStatus::Active);
        let status = apply(status, ProgressEvent::AnsweredCorrectly);
        assert_eq!(status, GameStatus::Active);
        let status = apply(status, ProgressEvent::QuestionLoaded);
        assert_eq!(status, GameStatus::Active);
        assert_eq!(apply(status, ProgressEvent::Exhausted), GameStatus::Won);
    }

    #[test]
    fn wrong_answer_and_quit_end_the_game() {
        assert_eq!(
            apply(GameStatus::Active, ProgressEvent::AnsweredIncorrectly),
            GameStatus::GameOver
        );
        assert_eq!(apply(GameStatus::Active, ProgressEvent::Quit), GameStatus::Quit);
    }

    #[test]
    fn ready_user_without_questions_wins_directly() {
        assert_eq!(apply(GameStatus::Ready, ProgressEvent::Exhausted), GameStatus::Won);
    }

    #[test]
    fn terminal_statuses_reject_every_event() {
        let events = [
            ProgressEvent::QuestionLoaded,
            ProgressEvent::AnsweredCorrectly,
            ProgressEvent::AnsweredIncorrectly,
            ProgressEvent::Exhausted,
            ProgressEvent::Quit,
        ];
        for from in [GameStatus::Won, GameStatus::GameOver, GameStatus::Quit] {
            assert!(from.is_terminal());
            for event in events {
                let err = from.transition(event).unwrap_err();
                assert_eq!(err, InvalidTransition { from, event });
            }
        }
    }

    #[test]
    fn ready_user_cannot_answer_or_quit() {
        assert!(GameStatus::Ready.transition(ProgressEvent::AnsweredCorrectly).is_err());
        assert!(GameStatus::Ready.transition(ProgressEvent::Quit).is_err());
    }

    #[test]
    fn status_serializes_as_lowercase_wire_names() {
        assert_eq!(
            serde_json::to_string(&GameStatus::GameOver).unwrap(),
            "\"gameover\""
        );
        let status: GameStatus = serde_json::from_str("\"quit\"").unwrap();
        assert_eq!(status, GameStatus::Quit);
    }
}
