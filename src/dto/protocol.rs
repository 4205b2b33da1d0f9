//! Payloads exchanged over the broadcast channel, one type per topic.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::{
    channel::{ChannelMessage, Topic},
    game::{FffQuestion, Lifeline, OptionKey, UserProgress},
};

/// Failure to encode or decode a channel payload.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The received value does not match the topic's schema.
    #[error("malformed `{topic}` payload")]
    Malformed {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
    /// The value to publish could not be serialized.
    #[error("failed to serialize `{topic}` payload")]
    Serialize {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode the payload of a channel message.
pub fn decode<T: DeserializeOwned>(message: &ChannelMessage) -> Result<T, ProtocolError> {
    serde_json::from_str(&message.payload).map_err(|source| ProtocolError::Malformed {
        topic: message.topic,
        source,
    })
}

/// Admin verdict attached to `markAnswer`. Only drives the reveal styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MarkResult {
    /// Admin marked the answer right.
    Correct,
    /// Admin marked the answer wrong.
    Incorrect,
}

/// Commands sent by the admin screen to the display, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AdminCommand {
    /// Resume the question countdown.
    StartTimer,
    /// Pause the question countdown.
    StopTimer,
    /// Eliminate two wrong options.
    ActivateFiftyFifty,
    /// Replace the current question.
    ActivateSwapQuestion,
    /// Open the audience poll.
    ActivateAudiencePoll,
    /// Arm the double-dip second chance.
    ActivateDoubleDip,
    /// Show the poll tally collected by the admin.
    ShowPollResults {
        /// Votes per option; absent means no votes.
        #[serde(default)]
        data: Option<PollTally>,
    },
    /// Issue the next unasked question.
    LoadNextQuestion,
    /// Walk away with the last passed level.
    QuitGame,
    /// Select the contestant carried by the envelope's `userId`.
    SwitchUser,
    /// Resolve the pending selection.
    MarkAnswer {
        /// Admin verdict.
        result: MarkResult,
    },
}

impl AdminCommand {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            AdminCommand::StartTimer => "startTimer",
            AdminCommand::StopTimer => "stopTimer",
            AdminCommand::ActivateFiftyFifty => "activateFiftyFifty",
            AdminCommand::ActivateSwapQuestion => "activateSwapQuestion",
            AdminCommand::ActivateAudiencePoll => "activateAudiencePoll",
            AdminCommand::ActivateDoubleDip => "activateDoubleDip",
            AdminCommand::ShowPollResults { .. } => "showPollResults",
            AdminCommand::LoadNextQuestion => "loadNextQuestion",
            AdminCommand::QuitGame => "quitGame",
            AdminCommand::SwitchUser => "switchUser",
            AdminCommand::MarkAnswer { .. } => "markAnswer",
        }
    }
}

impl From<Lifeline> for AdminCommand {
    fn from(lifeline: Lifeline) -> Self {
        match lifeline {
            Lifeline::FiftyFifty => AdminCommand::ActivateFiftyFifty,
            Lifeline::SwapQuestion => AdminCommand::ActivateSwapQuestion,
            Lifeline::AudiencePoll => AdminCommand::ActivateAudiencePoll,
            Lifeline::DoubleDip => AdminCommand::ActivateDoubleDip,
        }
    }
}

/// Envelope written on [`Topic::AdminCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminMessage {
    /// The tagged command.
    #[serde(flatten)]
    pub command: AdminCommand,
    /// Contestant the command targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    /// Question index sent by older admin screens; not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Unix milliseconds at send time.
    pub timestamp: i64,
}

impl AdminMessage {
    /// Stamp `command` for `user_id` with the current time.
    pub fn new(command: AdminCommand, user_id: Option<u32>) -> Self {
        Self {
            command,
            user_id,
            index: None,
            timestamp: super::now_millis(),
        }
    }
}

/// Display to admin echo after every progress mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEcho {
    /// Contestant whose progress changed.
    pub user_id: u32,
    /// Full progress record.
    pub progress: UserProgress,
    /// Snapshot of the global asked set.
    pub asked_question_ids: Vec<u32>,
    /// Question on screen, which differs from the level after a swap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question_id: Option<u32>,
}

/// Display to admin echo of a player's option click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEcho {
    /// Contestant who clicked.
    pub user_id: u32,
    /// Question on screen.
    pub question_id: u32,
    /// Clicked option.
    pub selected_option: OptionKey,
}

/// A single audience vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollVote {
    /// Question the voter saw.
    pub question_id: u32,
    /// Chosen option.
    pub option: OptionKey,
    /// Free-form participant label.
    pub participant: String,
    /// Unix milliseconds at vote time.
    pub timestamp: i64,
}

/// Vote counts per option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PollTally {
    #[serde(rename = "A")]
    pub a: u32,
    #[serde(rename = "B")]
    pub b: u32,
    #[serde(rename = "C")]
    pub c: u32,
    #[serde(rename = "D")]
    pub d: u32,
}

/// Share of the votes per option, in percent with one decimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PollPercentages {
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "D")]
    pub d: f64,
}

impl PollTally {
    /// Count one vote for `option`.
    pub fn record(&mut self, option: OptionKey) {
        match option {
            OptionKey::A => self.a += 1,
            OptionKey::B => self.b += 1,
            OptionKey::C => self.c += 1,
            OptionKey::D => self.d += 1,
        }
    }

    /// Votes counted for `option`.
    pub fn votes(&self, option: OptionKey) -> u32 {
        match option {
            OptionKey::A => self.a,
            OptionKey::B => self.b,
            OptionKey::C => self.c,
            OptionKey::D => self.d,
        }
    }

    /// Total number of votes.
    pub fn total(&self) -> u32 {
        self.a + self.b + self.c + self.d
    }

    /// Percentages rounded to one decimal; every share is 0 without votes.
    pub fn percentages(&self) -> PollPercentages {
        let total = self.total();
        let share = |votes: u32| {
            if total == 0 {
                0.0
            } else {
                (f64::from(votes) * 1000.0 / f64::from(total)).round() / 10.0
            }
        };
        PollPercentages {
            a: share(self.a),
            b: share(self.b),
            c: share(self.c),
            d: share(self.d),
        }
    }
}

/// Round commands sent by the FFF admin screen, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum FffCommand {
    /// Open a round on the given question.
    StartRound {
        /// The ordering question.
        question: FffQuestion,
    },
    /// Close the running round.
    EndRound,
    /// Clear everything and return clients to waiting.
    ResetRound,
}

/// Envelope written on [`Topic::FffCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FffMessage {
    /// The tagged command.
    #[serde(flatten)]
    pub command: FffCommand,
    /// Unix milliseconds at send time.
    pub timestamp: i64,
}

impl FffMessage {
    /// Stamp `command` with the current time.
    pub fn new(command: FffCommand) -> Self {
        Self {
            command,
            timestamp: super::now_millis(),
        }
    }
}

/// A participant's complete ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FffSubmission {
    /// Participant name, unique per round.
    pub name: String,
    /// The four keys in tap order.
    pub answer_order: Vec<OptionKey>,
    /// Seconds elapsed between round start and the fourth tap.
    pub time: f64,
    /// Unix milliseconds at submit time.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_message_uses_the_flat_wire_shape() {
        let message = AdminMessage {
            command: AdminCommand::MarkAnswer {
                result: MarkResult::Incorrect,
            },
            user_id: Some(2),
            index: None,
            timestamp: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "action": "markAnswer",
                "result": "incorrect",
                "userId": 2,
                "timestamp": 1_700_000_000_000i64
            })
        );
    }

    #[test]
    fn parses_commands_written_by_a_browser_admin() {
        let message: AdminMessage = serde_json::from_str(
            r#"{"action":"showPollResults","data":{"A":3,"C":1},"userId":1,"timestamp":5}"#,
        )
        .unwrap();
        assert_eq!(
            message.command,
            AdminCommand::ShowPollResults {
                data: Some(PollTally {
                    a: 3,
                    c: 1,
                    ..PollTally::default()
                })
            }
        );

        let message: AdminMessage =
            serde_json::from_str(r#"{"action":"loadNextQuestion","index":4,"timestamp":9}"#)
                .unwrap();
        assert_eq!(message.command, AdminCommand::LoadNextQuestion);
        assert_eq!(message.index, Some(4));
        assert_eq!(message.user_id, None);
    }

    #[test]
    fn unknown_actions_are_rejected() {
        assert!(
            serde_json::from_str::<AdminMessage>(r#"{"action":"phoneAFriend","timestamp":1}"#)
                .is_err()
        );
    }

    #[test]
    fn percentages_use_one_decimal() {
        let tally = PollTally {
            a: 1,
            b: 2,
            c: 0,
            d: 0,
        };
        let percentages = tally.percentages();
        assert_eq!(percentages.a, 33.3);
        assert_eq!(percentages.b, 66.7);
        assert_eq!(percentages.c, 0.0);
    }

    #[test]
    fn empty_tally_has_zero_percentages() {
        assert_eq!(PollTally::default().percentages(), PollPercentages::default());
    }

    #[test]
    fn fff_round_commands_carry_the_question() {
        let message: FffMessage = serde_json::from_str(
            r#"{"action":"startRound","question":{"question":"Order","options":{"A":"1","B":"2","C":"3","D":"4"},"correctOrder":["A","B","C","D"]},"timestamp":1}"#,
        )
        .unwrap();
        assert!(matches!(message.command, FffCommand::StartRound { .. }));

        let message: FffMessage =
            serde_json::from_str(r#"{"action":"endRound","timestamp":2}"#).unwrap();
        assert_eq!(message.command, FffCommand::EndRound);
    }
}
