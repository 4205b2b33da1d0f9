//! Audience-side logic: poll ballots and the FFF answer sheet of one participant.

use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

use crate::{
    dto::{
        mobile::{PollBallotQuery, PollBallotResponse, PollVoteRequest, PollVoteResponse},
        now_millis,
        protocol::{FffCommand, FffSubmission, PollVote},
        ws::FffOutboundMessage,
    },
    error::ServiceError,
    state::{
        SharedState,
        channel::{ChannelHandle, Topic},
        game::{FffQuestion, OptionKey},
    },
};

/// Reasons a poll ballot is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BallotError {
    /// The participant never fetched the question.
    #[error("no ballot was opened for this question")]
    NotOpened,
    /// The voting window closed.
    #[error("time is up for this poll")]
    Expired,
    /// The single vote was already cast.
    #[error("a vote was already cast")]
    AlreadyVoted,
}

#[derive(Debug, Clone, Copy)]
struct Ballot {
    opened_at: Instant,
    voted: bool,
}

/// One ballot per participant and question, each open for a fixed window.
#[derive(Debug)]
pub struct PollBallots {
    ballots: DashMap<(u32, String), Ballot>,
    window: Duration,
}

impl PollBallots {
    /// Ballots that stay open for `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            ballots: DashMap::new(),
            window,
        }
    }

    /// Open (or reopen) a ballot and return the seconds left to vote. Reopening keeps
    /// the original deadline.
    pub fn open(&self, question_id: u32, participant: &str, now: Instant) -> u32 {
        let ballot = *self
            .ballots
            .entry((question_id, participant.to_string()))
            .or_insert(Ballot {
                opened_at: now,
                voted: false,
            });
        let left = self
            .window
            .saturating_sub(now.saturating_duration_since(ballot.opened_at));
        u32::try_from(left.as_secs()).unwrap_or(u32::MAX)
    }

    /// Cast the single vote of a ballot.
    pub fn cast(
        &self,
        question_id: u32,
        participant: &str,
        option: OptionKey,
        now: Instant,
    ) -> Result<PollVote, BallotError> {
        let mut ballot = self
            .ballots
            .get_mut(&(question_id, participant.to_string()))
            .ok_or(BallotError::NotOpened)?;
        if ballot.voted {
            return Err(BallotError::AlreadyVoted);
        }
        if now.saturating_duration_since(ballot.opened_at) > self.window {
            return Err(BallotError::Expired);
        }
        ballot.voted = true;

        Ok(PollVote {
            question_id,
            option,
            participant: participant.to_string(),
            timestamp: now_millis(),
        })
    }
}

/// Resolve the ballot's question and open the voting window.
pub fn open_ballot(
    state: &SharedState,
    query: PollBallotQuery,
) -> Result<PollBallotResponse, ServiceError> {
    let session = state.require_session()?;
    let question_id = query
        .question_id
        .ok_or_else(|| ServiceError::InvalidInput("no question id provided".into()))?;
    let level = session
        .bank
        .level(question_id)
        .ok_or_else(|| ServiceError::NotFound(format!("question {question_id} not found")))?;

    let participant = query.participant.trim();
    let expires_in_seconds = state
        .ballots()
        .open(question_id, participant, Instant::now());
    info!(question_id, participant, "poll ballot opened");

    Ok(PollBallotResponse {
        question_id,
        user_id: query.user_id,
        question: level.question.clone(),
        options: level.options.clone(),
        expires_in_seconds,
    })
}

/// Cast a vote and publish it to the admin tally.
pub fn cast_vote(
    state: &SharedState,
    request: PollVoteRequest,
) -> Result<PollVoteResponse, ServiceError> {
    let participant = request.participant.trim();
    let vote = state.ballots().cast(
        request.question_id,
        participant,
        request.option,
        Instant::now(),
    )?;

    ChannelHandle::new(state.channel()).publish(Topic::PollVote, &vote)?;
    info!(
        question_id = vote.question_id,
        option = %vote.option,
        participant = %vote.participant,
        "poll vote published"
    );
    Ok(PollVoteResponse { vote })
}

/// Where an FFF participant's sheet stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetState {
    /// Identified, no round running.
    Waiting,
    /// Collecting the ordering.
    Answering {
        /// Round question.
        question: FffQuestion,
        /// When the question reached the participant.
        started: Instant,
        /// Keys tapped so far.
        order: Vec<OptionKey>,
    },
    /// The ordering was submitted.
    Submitted {
        /// Submitted ordering.
        answer_order: Vec<OptionKey>,
        /// Seconds taken.
        time: f64,
    },
    /// The round ended before the ordering was complete.
    TimedOut,
}

/// Result of a tap.
#[derive(Debug, Clone, PartialEq)]
pub enum TapOutcome {
    /// Added to the ordering.
    Recorded {
        /// Tapped key.
        option: OptionKey,
        /// 1-based position in the ordering.
        position: usize,
    },
    /// The key was already placed.
    Ignored,
    /// Fourth distinct key: the ordering is ready to submit.
    Complete(FffSubmission),
}

/// Reasons a tap is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SheetError {
    /// No round is being answered.
    #[error("no question is being answered")]
    NotAnswering,
}

/// The FFF ordering collected from one participant.
#[derive(Debug, Clone)]
pub struct FffAnswerSheet {
    name: String,
    seconds: u32,
    state: SheetState,
}

impl FffAnswerSheet {
    /// Fresh sheet for an identified participant.
    pub fn new(name: impl Into<String>, seconds: u32) -> Self {
        Self {
            name: name.into(),
            seconds,
            state: SheetState::Waiting,
        }
    }

    /// Participant name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> &SheetState {
        &self.state
    }

    /// When the running answer times out.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            SheetState::Answering { started, .. } => {
                Some(*started + Duration::from_secs(u64::from(self.seconds)))
            }
            _ => None,
        }
    }

    /// Apply a round command relayed from the FFF admin.
    pub fn on_command(&mut self, command: &FffCommand, now: Instant) -> Option<FffOutboundMessage> {
        match command {
            FffCommand::StartRound { question } => {
                if matches!(self.state, SheetState::Answering { .. }) {
                    return None;
                }
                self.state = SheetState::Answering {
                    question: question.clone(),
                    started: now,
                    order: Vec::with_capacity(4),
                };
                Some(FffOutboundMessage::Question {
                    question: question.question.clone(),
                    options: question.options.clone(),
                    seconds: self.seconds,
                })
            }
            FffCommand::EndRound => self.time_out().then_some(FffOutboundMessage::TimeUp),
            FffCommand::ResetRound => {
                self.state = SheetState::Waiting;
                Some(FffOutboundMessage::Waiting)
            }
        }
    }

    /// Add a tapped key to the ordering.
    pub fn tap(&mut self, option: OptionKey, now: Instant) -> Result<TapOutcome, SheetError> {
        let SheetState::Answering { started, order, .. } = &mut self.state else {
            return Err(SheetError::NotAnswering);
        };
        if order.contains(&option) {
            return Ok(TapOutcome::Ignored);
        }
        order.push(option);
        if order.len() < OptionKey::ALL.len() {
            return Ok(TapOutcome::Recorded {
                option,
                position: order.len(),
            });
        }

        let elapsed = now.saturating_duration_since(*started).as_secs_f64();
        let time = (elapsed * 100.0).round() / 100.0;
        let answer_order = std::mem::take(order);
        self.state = SheetState::Submitted {
            answer_order: answer_order.clone(),
            time,
        };
        Ok(TapOutcome::Complete(FffSubmission {
            name: self.name.clone(),
            answer_order,
            time,
            timestamp: now_millis(),
        }))
    }

    /// Give up on an unfinished ordering. Returns whether anything changed.
    pub fn time_out(&mut self) -> bool {
        if matches!(self.state, SheetState::Answering { .. }) {
            self.state = SheetState::TimedOut;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::QuestionOptions;
    use OptionKey::{A, B, C, D};

    fn question() -> FffQuestion {
        FffQuestion {
            question: "Arrange from smallest to largest".into(),
            options: QuestionOptions {
                a: "Kilobyte".into(),
                b: "Byte".into(),
                c: "Terabyte".into(),
                d: "Megabyte".into(),
            },
            correct_order: vec![B, A, D, C],
        }
    }

    fn answering(now: Instant) -> FffAnswerSheet {
        let mut sheet = FffAnswerSheet::new("Meera", 60);
        sheet.on_command(
            &FffCommand::StartRound {
                question: question(),
            },
            now,
        );
        sheet
    }

    #[test]
    fn ballot_accepts_a_single_vote() {
        let ballots = PollBallots::new(Duration::from_secs(60));
        let now = Instant::now();
        assert_eq!(ballots.open(3, "Seat 7", now), 60);

        let vote = ballots.cast(3, "Seat 7", C, now).unwrap();
        assert_eq!(vote.option, C);
        assert_eq!(vote.participant, "Seat 7");
        assert_eq!(
            ballots.cast(3, "Seat 7", D, now).unwrap_err(),
            BallotError::AlreadyVoted
        );
    }

    #[test]
    fn ballot_closes_after_its_window() {
        let ballots = PollBallots::new(Duration::from_secs(60));
        let opened = Instant::now();
        ballots.open(3, "Seat 7", opened);

        let later = opened + Duration::from_secs(61);
        assert_eq!(ballots.open(3, "Seat 7", later), 0);
        assert_eq!(
            ballots.cast(3, "Seat 7", A, later).unwrap_err(),
            BallotError::Expired
        );
        assert_eq!(
            ballots.cast(4, "Seat 7", A, opened).unwrap_err(),
            BallotError::NotOpened
        );
    }

    #[test]
    fn fourth_distinct_tap_submits() {
        let start = Instant::now();
        let mut sheet = answering(start);

        assert_eq!(
            sheet.tap(B, start).unwrap(),
            TapOutcome::Recorded {
                option: B,
                position: 1
            }
        );
        assert_eq!(sheet.tap(B, start).unwrap(), TapOutcome::Ignored);
        sheet.tap(A, start).unwrap();
        sheet.tap(D, start).unwrap();

        let outcome = sheet.tap(C, start + Duration::from_millis(12_345)).unwrap();
        let TapOutcome::Complete(submission) = outcome else {
            panic!("expected a submission");
        };
        assert_eq!(submission.name, "Meera");
        assert_eq!(submission.answer_order, vec![B, A, D, C]);
        assert_eq!(submission.time, 12.35);
        assert!(matches!(sheet.state(), SheetState::Submitted { .. }));
        assert_eq!(sheet.tap(A, start).unwrap_err(), SheetError::NotAnswering);
    }

    #[test]
    fn start_is_ignored_while_answering() {
        let start = Instant::now();
        let mut sheet = answering(start);
        sheet.tap(A, start).unwrap();

        let again = sheet.on_command(
            &FffCommand::StartRound {
                question: question(),
            },
            start,
        );
        assert!(again.is_none());
        let SheetState::Answering { order, .. } = sheet.state() else {
            panic!("expected to still be answering");
        };
        assert_eq!(order, &vec![A]);
    }

    #[test]
    fn end_round_times_out_unfinished_sheets_only() {
        let start = Instant::now();
        let mut sheet = answering(start);
        assert_eq!(
            sheet.on_command(&FffCommand::EndRound, start),
            Some(FffOutboundMessage::TimeUp)
        );
        assert_eq!(sheet.state(), &SheetState::TimedOut);
        assert_eq!(sheet.on_command(&FffCommand::EndRound, start), None);

        assert_eq!(
            sheet.on_command(&FffCommand::ResetRound, start),
            Some(FffOutboundMessage::Waiting)
        );
        assert_eq!(sheet.state(), &SheetState::Waiting);
    }

    #[test]
    fn deadline_follows_the_round_length() {
        let start = Instant::now();
        let sheet = answering(start);
        assert_eq!(sheet.deadline(), Some(start + Duration::from_secs(60)));
        assert_eq!(FffAnswerSheet::new("idle", 60).deadline(), None);
    }
}
