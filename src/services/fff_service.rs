//! Fastest-finger-first coordinator: round lifecycle, countdown, submissions and ranking.

use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        display::{TimerEvent, TimerKind},
        fff::{LeaderboardResponse, RoundStartedEvent, RoundStatusResponse, SubmissionReceivedEvent},
        protocol::{self, FffCommand, FffMessage, FffSubmission},
    },
    services::{
        countdown::{Countdown, PULSE_THRESHOLD, TickOutcome},
        ranking::{self, FffParticipant},
        sse_events,
    },
    state::{
        SseHub,
        channel::{ChannelHandle, ChannelMessage, ChannelSubscription, Topic},
        game::FffQuestion,
    },
};

const INPUT_CAPACITY: usize = 32;

/// Errors raised by the FFF round lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FffError {
    /// The question bank has no FFF question.
    #[error("no fastest-finger-first question is loaded")]
    NoQuestion,
    /// A round is already running.
    #[error("a round is already active")]
    RoundActive,
    /// No round is running.
    #[error("no round is active")]
    RoundInactive,
    /// The name already submitted in this round; the first submission stands.
    #[error("`{0}` already submitted in this round")]
    DuplicateSubmission(String),
    /// The coordinator task is gone.
    #[error("fastest-finger-first coordinator stopped")]
    Stopped,
}

/// Round state, free of any I/O.
#[derive(Debug, Default)]
pub struct FffRound {
    question: Option<FffQuestion>,
    active: bool,
    participants: IndexMap<String, FffParticipant>,
}

impl FffRound {
    /// Idle round over `question`.
    pub fn new(question: Option<FffQuestion>) -> Self {
        Self {
            question,
            active: false,
            participants: IndexMap::new(),
        }
    }

    /// Whether submissions are being accepted.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Submissions collected so far, in arrival order.
    pub fn participants(&self) -> impl Iterator<Item = &FffParticipant> {
        self.participants.values()
    }

    /// Open a round, discarding previous submissions.
    pub fn start(&mut self) -> Result<FffQuestion, FffError> {
        let question = self.question.clone().ok_or(FffError::NoQuestion)?;
        if self.active {
            return Err(FffError::RoundActive);
        }
        self.participants.clear();
        self.active = true;
        Ok(question)
    }

    /// Score and store a submission. First write per name wins.
    pub fn accept(&mut self, submission: FffSubmission) -> Result<&FffParticipant, FffError> {
        if !self.active {
            return Err(FffError::RoundInactive);
        }
        let Some(question) = &self.question else {
            return Err(FffError::NoQuestion);
        };
        if self.participants.contains_key(&submission.name) {
            return Err(FffError::DuplicateSubmission(submission.name));
        }

        let participant = FffParticipant::new(
            submission.name.clone(),
            submission.answer_order,
            submission.time,
            &question.correct_order,
        );
        let entry = self
            .participants
            .entry(submission.name)
            .or_insert(participant);
        Ok(entry)
    }

    /// Close the running round.
    pub fn end(&mut self) -> Result<(), FffError> {
        if !self.active {
            return Err(FffError::RoundInactive);
        }
        self.active = false;
        Ok(())
    }

    /// Close any round and forget its submissions.
    pub fn reset(&mut self) {
        self.active = false;
        self.participants.clear();
    }

    /// Ranked top `limit`; only available once the round is closed.
    pub fn leaderboard(&self, limit: usize) -> Result<LeaderboardResponse, FffError> {
        if self.active {
            return Err(FffError::RoundActive);
        }
        let question = self.question.as_ref().ok_or(FffError::NoQuestion)?;
        let participants: Vec<FffParticipant> = self.participants.values().cloned().collect();
        Ok(LeaderboardResponse {
            correct_order: question.correct_order.clone(),
            participants: participants.len(),
            entries: ranking::leaderboard(&participants, limit),
        })
    }
}

/// Coordinator settings taken from the app configuration.
#[derive(Debug, Clone)]
pub struct FffSettings {
    /// Round duration.
    pub seconds: u32,
    /// Leaderboard length.
    pub leaderboard_size: usize,
    /// Link encoded in the join QR code.
    pub join_url: String,
}

enum FffInput {
    Start {
        reply: oneshot::Sender<Result<RoundStatusResponse, FffError>>,
    },
    End {
        reply: oneshot::Sender<Result<LeaderboardResponse, FffError>>,
    },
    Reset {
        reply: oneshot::Sender<RoundStatusResponse>,
    },
    Leaderboard {
        reply: oneshot::Sender<Result<LeaderboardResponse, FffError>>,
    },
    Status {
        reply: oneshot::Sender<RoundStatusResponse>,
    },
}

/// Cloneable front of the coordinator task.
#[derive(Clone)]
pub struct FffHandle {
    inputs: mpsc::Sender<FffInput>,
}

impl FffHandle {
    /// Open a round and relay it to mobile clients.
    pub async fn start_round(&self) -> Result<RoundStatusResponse, FffError> {
        self.request(|reply| FffInput::Start { reply }).await?
    }

    /// Close the round, rank the submissions and show the leaderboard.
    pub async fn end_round(&self) -> Result<LeaderboardResponse, FffError> {
        self.request(|reply| FffInput::End { reply }).await?
    }

    /// Clear the round and send clients back to waiting.
    pub async fn reset_round(&self) -> Result<RoundStatusResponse, FffError> {
        self.request(|reply| FffInput::Reset { reply }).await
    }

    /// Show the leaderboard of the last closed round.
    pub async fn leaderboard(&self) -> Result<LeaderboardResponse, FffError> {
        self.request(|reply| FffInput::Leaderboard { reply }).await?
    }

    /// Current round status.
    pub async fn status(&self) -> Result<RoundStatusResponse, FffError> {
        self.request(|reply| FffInput::Status { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> FffInput,
    ) -> Result<T, FffError> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(build(reply))
            .await
            .map_err(|_| FffError::Stopped)?;
        response.await.map_err(|_| FffError::Stopped)
    }
}

/// Spawn the coordinator task.
pub fn spawn(
    question: Option<FffQuestion>,
    channel: ChannelHandle,
    hub: SseHub,
    settings: FffSettings,
) -> FffHandle {
    let (inputs, receiver) = mpsc::channel(INPUT_CAPACITY);
    let coordinator = FffCoordinator {
        countdown: Countdown::new(settings.seconds),
        round: FffRound::new(question),
        channel,
        hub,
        settings,
    };
    let subscription = coordinator.channel.subscribe();
    tokio::spawn(coordinator.run(receiver, subscription));
    FffHandle { inputs }
}

struct FffCoordinator {
    round: FffRound,
    countdown: Countdown,
    channel: ChannelHandle,
    hub: SseHub,
    settings: FffSettings,
}

impl FffCoordinator {
    async fn run(
        mut self,
        mut inputs: mpsc::Receiver<FffInput>,
        mut subscription: ChannelSubscription,
    ) {
        let (tick_tx, mut ticks) = mpsc::unbounded_channel::<u64>();

        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input, &tick_tx),
                    None => break,
                },
                Some(generation) = ticks.recv() => self.handle_tick(generation),
                message = subscription.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
            }
        }

        debug!("FFF coordinator stopped");
    }

    fn handle_input(&mut self, input: FffInput, tick_tx: &mpsc::UnboundedSender<u64>) {
        match input {
            FffInput::Start { reply } => {
                let _ = reply.send(self.start(tick_tx));
            }
            FffInput::End { reply } => {
                let _ = reply.send(self.end());
            }
            FffInput::Reset { reply } => {
                self.reset();
                let _ = reply.send(self.status());
            }
            FffInput::Leaderboard { reply } => {
                let board = self.round.leaderboard(self.settings.leaderboard_size);
                if let Ok(board) = &board {
                    sse_events::broadcast_leaderboard(&self.hub, board);
                }
                let _ = reply.send(board);
            }
            FffInput::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn start(
        &mut self,
        tick_tx: &mpsc::UnboundedSender<u64>,
    ) -> Result<RoundStatusResponse, FffError> {
        let question = self.round.start()?;
        self.countdown.restart(tick_tx.clone(), |generation| generation);
        self.publish(FffCommand::StartRound {
            question: question.clone(),
        });
        sse_events::broadcast_round_started(
            &self.hub,
            &RoundStartedEvent {
                question: question.question,
                options: question.options,
                seconds: self.settings.seconds,
                join_url: self.settings.join_url.clone(),
            },
        );
        info!(seconds = self.settings.seconds, "FFF round started");
        Ok(self.status())
    }

    fn end(&mut self) -> Result<LeaderboardResponse, FffError> {
        self.round.end()?;
        self.countdown.stop();
        self.publish(FffCommand::EndRound);
        let board = self.round.leaderboard(self.settings.leaderboard_size)?;
        sse_events::broadcast_leaderboard(&self.hub, &board);
        info!(participants = board.participants, "FFF round ended");
        Ok(board)
    }

    fn reset(&mut self) {
        self.countdown.reset();
        self.round.reset();
        self.publish(FffCommand::ResetRound);
        sse_events::broadcast_round_reset(&self.hub);
        info!("FFF round reset");
    }

    fn handle_tick(&mut self, generation: u64) {
        match self.countdown.tick(generation) {
            TickOutcome::Stale => {}
            TickOutcome::Running { remaining } => self.broadcast_timer(remaining, true),
            TickOutcome::Expired => {
                self.broadcast_timer(0, false);
                info!("FFF countdown expired; ending round");
                if let Err(err) = self.end() {
                    debug!(error = %err, "round already closed at expiry");
                }
            }
        }
    }

    fn handle_message(&mut self, message: ChannelMessage) {
        if message.topic != Topic::FffSubmission {
            return;
        }
        let submission: FffSubmission = match protocol::decode(&message) {
            Ok(submission) => submission,
            Err(err) => {
                warn!(error = %err, "dropping malformed FFF submission");
                return;
            }
        };

        match self.round.accept(submission) {
            Ok(participant) => {
                info!(
                    name = %participant.name,
                    time = participant.time,
                    correct = participant.correct,
                    "FFF submission received"
                );
                let event = SubmissionReceivedEvent {
                    name: participant.name.clone(),
                    participants: self.round.participants().count(),
                };
                sse_events::broadcast_submission_received(&self.hub, &event);
            }
            Err(FffError::DuplicateSubmission(name)) => {
                warn!(%name, "duplicate FFF submission ignored");
            }
            Err(err) => debug!(error = %err, "FFF submission ignored"),
        }
    }

    fn broadcast_timer(&self, remaining: u32, running: bool) {
        sse_events::broadcast_timer(
            &self.hub,
            &TimerEvent {
                timer: TimerKind::Fff,
                remaining,
                running,
                pulse: running && remaining <= PULSE_THRESHOLD,
            },
        );
    }

    fn publish(&self, command: FffCommand) {
        if let Err(err) = self
            .channel
            .publish(Topic::FffCommand, &FffMessage::new(command))
        {
            warn!(error = %err, "failed to publish FFF command");
        }
    }

    fn status(&self) -> RoundStatusResponse {
        RoundStatusResponse {
            active: self.round.is_active(),
            participants: self.round.participants().count(),
            remaining: self.countdown.remaining(),
            join_url: self.settings.join_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::{
        channel::{BroadcastChannel, LocalChannel},
        game::{OptionKey, QuestionOptions},
    };
    use OptionKey::{A, B, C, D};

    fn question() -> FffQuestion {
        FffQuestion {
            question: "Order these planets by distance from the sun".into(),
            options: QuestionOptions {
                a: "Mars".into(),
                b: "Mercury".into(),
                c: "Jupiter".into(),
                d: "Earth".into(),
            },
            correct_order: vec![B, D, A, C],
        }
    }

    fn submission(name: &str, order: [OptionKey; 4], time: f64) -> FffSubmission {
        FffSubmission {
            name: name.into(),
            answer_order: order.to_vec(),
            time,
            timestamp: 0,
        }
    }

    #[test]
    fn start_requires_a_question_and_no_running_round() {
        let mut empty = FffRound::new(None);
        assert_eq!(empty.start(), Err(FffError::NoQuestion));

        let mut round = FffRound::new(Some(question()));
        round.start().unwrap();
        assert_eq!(round.start(), Err(FffError::RoundActive));
    }

    #[test]
    fn first_submission_per_name_wins() {
        let mut round = FffRound::new(Some(question()));
        round.start().unwrap();
        round.accept(submission("Meera", [B, D, A, C], 7.5)).unwrap();

        let err = round
            .accept(submission("Meera", [A, B, C, D], 2.0))
            .unwrap_err();
        assert_eq!(err, FffError::DuplicateSubmission("Meera".into()));

        let stored: Vec<&FffParticipant> = round.participants().collect();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].correct);
        assert_eq!(stored[0].time, 7.5);
    }

    #[test]
    fn submissions_outside_a_round_are_refused() {
        let mut round = FffRound::new(Some(question()));
        assert_eq!(
            round.accept(submission("late", [B, D, A, C], 1.0)).unwrap_err(),
            FffError::RoundInactive
        );

        round.start().unwrap();
        round.end().unwrap();
        assert_eq!(
            round.accept(submission("late", [B, D, A, C], 1.0)).unwrap_err(),
            FffError::RoundInactive
        );
    }

    #[test]
    fn restarting_clears_previous_participants() {
        let mut round = FffRound::new(Some(question()));
        round.start().unwrap();
        round.accept(submission("Meera", [B, D, A, C], 7.5)).unwrap();
        round.end().unwrap();

        round.start().unwrap();
        assert_eq!(round.participants().count(), 0);
    }

    #[test]
    fn leaderboard_waits_for_the_round_to_close() {
        let mut round = FffRound::new(Some(question()));
        round.start().unwrap();
        round.accept(submission("quick", [A, B, C, D], 3.0)).unwrap();
        round.accept(submission("right", [B, D, A, C], 9.0)).unwrap();
        assert_eq!(round.leaderboard(10).unwrap_err(), FffError::RoundActive);

        round.end().unwrap();
        let board = round.leaderboard(10).unwrap();
        assert_eq!(board.participants, 2);
        assert_eq!(board.entries[0].name, "right");
        assert_eq!(board.correct_order, vec![B, D, A, C]);
    }

    fn settings() -> FffSettings {
        FffSettings {
            seconds: 60,
            leaderboard_size: 10,
            join_url: "http://localhost:8080/mobile.html?round=fff".into(),
        }
    }

    #[tokio::test]
    async fn coordinator_collects_channel_submissions() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(32));
        let hub = SseHub::new(32);
        let handle = spawn(
            Some(question()),
            ChannelHandle::new(channel.clone()),
            hub.clone(),
            settings(),
        );
        let mobile = ChannelHandle::new(channel.clone());

        let status = handle.start_round().await.unwrap();
        assert!(status.active);
        let relayed: FffMessage =
            serde_json::from_str(&channel.read(Topic::FffCommand).unwrap()).unwrap();
        assert!(matches!(relayed.command, FffCommand::StartRound { .. }));

        mobile
            .publish(Topic::FffSubmission, &submission("Meera", [B, D, A, C], 4.2))
            .unwrap();
        for _ in 0..50 {
            if handle.status().await.unwrap().participants == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let board = handle.end_round().await.unwrap();
        assert_eq!(board.participants, 1);
        assert_eq!(board.entries[0].name, "Meera");
        assert!(board.entries[0].correct);

        let relayed: FffMessage =
            serde_json::from_str(&channel.read(Topic::FffCommand).unwrap()).unwrap();
        assert_eq!(relayed.command, FffCommand::EndRound);
    }

    #[tokio::test]
    async fn malformed_submission_does_not_stop_the_coordinator() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(32));
        let handle = spawn(
            Some(question()),
            ChannelHandle::new(channel.clone()),
            SseHub::new(32),
            settings(),
        );
        let mobile = ChannelHandle::new(channel.clone());
        handle.start_round().await.unwrap();

        channel.write(mobile.origin(), Topic::FffSubmission, "[1, 2".into());
        mobile
            .publish(Topic::FffSubmission, &submission("Arjun", [B, D, A, C], 6.1))
            .unwrap();
        for _ in 0..50 {
            if handle.status().await.unwrap().participants == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let board = handle.end_round().await.unwrap();
        assert_eq!(board.participants, 1);
        assert_eq!(board.entries[0].name, "Arjun");
    }

    #[tokio::test]
    async fn end_without_a_round_is_rejected() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(8));
        let handle = spawn(
            Some(question()),
            ChannelHandle::new(channel),
            SseHub::new(8),
            settings(),
        );
        assert_eq!(handle.end_round().await.unwrap_err(), FffError::RoundInactive);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_ends_the_round() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(8));
        let hub = SseHub::new(128);
        let mut events = hub.subscribe();
        let handle = spawn(
            Some(question()),
            ChannelHandle::new(channel),
            hub,
            FffSettings {
                seconds: 2,
                ..settings()
            },
        );
        handle.start_round().await.unwrap();

        loop {
            let event = events.recv().await.unwrap();
            if event.event.as_deref() == Some("fff.leaderboard") {
                break;
            }
        }
        assert!(!handle.status().await.unwrap().active);
    }
}
