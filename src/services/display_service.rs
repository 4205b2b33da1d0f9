//! The game display: sole owner of the [`GameEngine`].
//!
//! One task applies admin commands read from the channel, local player input and timer
//! ticks in arrival order, echoes progress back to the admin and renders everything on
//! the public SSE stream.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        admin::UserSummary,
        display::{
            AnswerRevealEvent, DisplaySnapshot, GameOverEvent, LifelinesEvent, NoticeLevel,
            OptionsEliminatedEvent, PollCloseReason, PollInviteEvent, PollResultsEvent,
            QuestionShownEvent, QuestionView, SelectionEvent, TimerEvent, TimerKind, money_tree,
        },
        protocol::{self, AdminMessage, PollTally, SelectionEcho},
    },
    services::{
        countdown::{Countdown, PULSE_THRESHOLD, TickOutcome},
        game_engine::{
            CommandOutcome, DoubleDip, EngineError, GameEnd, GameEngine, LifelineOutcome,
            MarkOutcome, QuestionLoad, Resolution, SwitchOutcome,
        },
        sse_events,
    },
    state::{
        SseHub,
        channel::{ChannelHandle, ChannelMessage, ChannelSubscription, Topic},
        game::{OptionKey, QuestionLevel},
        state_machine::GameStatus,
    },
};

const INPUT_CAPACITY: usize = 32;
const SWAP_EXHAUSTED_NOTICE: &str =
    "Could not find an unasked question to swap with. Lifeline not used.";

/// Errors returned to local display input.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// The engine refused the input.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The display task is gone.
    #[error("display stopped")]
    Stopped,
}

/// Display settings taken from the app configuration.
#[derive(Debug, Clone)]
pub struct DisplaySettings {
    /// Question countdown.
    pub question_seconds: u32,
    /// Poll QR invite lifetime.
    pub poll_seconds: u32,
    /// Base of the links encoded in QR codes.
    pub public_base_url: String,
}

impl DisplaySettings {
    /// Link of the audience poll ballot for a question.
    pub fn poll_url(&self, question_id: u32, user_id: u32) -> String {
        format!(
            "{}/poll.html?questionId={question_id}&userId={user_id}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

enum DisplayInput {
    Select {
        option: OptionKey,
        reply: oneshot::Sender<Result<SelectionEcho, EngineError>>,
    },
    ClosePoll {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<DisplaySnapshot>,
    },
}

#[derive(Debug, Clone, Copy)]
enum TimerTick {
    Question(u64),
    Poll(u64),
}

#[derive(Debug, Clone, Copy)]
struct OpenPoll {
    question_id: u32,
    user_id: u32,
}

/// Cloneable front of the display task.
#[derive(Clone)]
pub struct DisplayHandle {
    inputs: mpsc::Sender<DisplayInput>,
}

impl DisplayHandle {
    /// Player clicked `option`.
    pub async fn select_option(&self, option: OptionKey) -> Result<SelectionEcho, DisplayError> {
        let (reply, response) = oneshot::channel();
        self.send(DisplayInput::Select { option, reply }).await?;
        Ok(response.await.map_err(|_| DisplayError::Stopped)??)
    }

    /// Close the poll QR modal. Returns `false` when none was open.
    pub async fn close_poll(&self) -> Result<bool, DisplayError> {
        let (reply, response) = oneshot::channel();
        self.send(DisplayInput::ClosePoll { reply }).await?;
        response.await.map_err(|_| DisplayError::Stopped)
    }

    /// What the display currently shows.
    pub async fn snapshot(&self) -> Result<DisplaySnapshot, DisplayError> {
        let (reply, response) = oneshot::channel();
        self.send(DisplayInput::Snapshot { reply }).await?;
        response.await.map_err(|_| DisplayError::Stopped)
    }

    async fn send(&self, input: DisplayInput) -> Result<(), DisplayError> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| DisplayError::Stopped)
    }
}

/// Spawn the display task and put the first contestant on screen.
pub fn spawn(
    engine: GameEngine,
    channel: ChannelHandle,
    hub: SseHub,
    settings: DisplaySettings,
) -> DisplayHandle {
    let (inputs, receiver) = mpsc::channel(INPUT_CAPACITY);
    let (tick_tx, ticks) = mpsc::unbounded_channel();
    let actor = DisplayActor {
        question_timer: Countdown::new(settings.question_seconds),
        poll_timer: Countdown::new(settings.poll_seconds),
        poll: None,
        engine,
        channel,
        hub,
        settings,
        tick_tx,
    };
    let subscription = actor.channel.subscribe();
    tokio::spawn(actor.run(receiver, ticks, subscription));
    DisplayHandle { inputs }
}

struct DisplayActor {
    engine: GameEngine,
    question_timer: Countdown,
    poll_timer: Countdown,
    poll: Option<OpenPoll>,
    channel: ChannelHandle,
    hub: SseHub,
    settings: DisplaySettings,
    tick_tx: mpsc::UnboundedSender<TimerTick>,
}

impl DisplayActor {
    async fn run(
        mut self,
        mut inputs: mpsc::Receiver<DisplayInput>,
        mut ticks: mpsc::UnboundedReceiver<TimerTick>,
        mut subscription: ChannelSubscription,
    ) {
        self.bootstrap();

        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                Some(tick) = ticks.recv() => self.handle_tick(tick),
                message = subscription.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
            }
        }

        debug!("display stopped");
    }

    fn bootstrap(&mut self) {
        let Some(first) = self.engine.first_user_id() else {
            warn!("no contestants registered");
            sse_events::broadcast_notice(&self.hub, NoticeLevel::Error, "No contestants registered.");
            return;
        };
        match self.engine.switch_user(first) {
            Ok(outcome) => {
                self.on_switched(outcome);
                self.publish_progress();
            }
            Err(err) => self.report("switchUser", err),
        }
    }

    fn handle_input(&mut self, input: DisplayInput) {
        match input {
            DisplayInput::Select { option, reply } => {
                let _ = reply.send(self.select(option));
            }
            DisplayInput::ClosePoll { reply } => {
                let _ = reply.send(self.close_poll(PollCloseReason::Closed));
            }
            DisplayInput::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_message(&mut self, message: ChannelMessage) {
        if message.topic != Topic::AdminCommand {
            return;
        }
        let command: AdminMessage = match protocol::decode(&message) {
            Ok(command) => command,
            Err(err) => {
                warn!(error = %err, "dropping malformed admin command");
                return;
            }
        };

        let action = command.command.action();
        debug!(action, user_id = ?command.user_id, "admin command received");
        match self.engine.apply(&command) {
            Ok(outcome) => {
                self.on_outcome(outcome);
                self.publish_progress();
            }
            Err(err) => self.report(action, err),
        }
    }

    fn report(&self, action: &str, err: EngineError) {
        match err {
            EngineError::LifelineUnavailable(lifeline) => {
                debug!(action, %lifeline, "lifeline unavailable; ignoring");
            }
            EngineError::UserMismatch { expected, got } => {
                debug!(action, expected, got, "command for another contestant; ignoring");
            }
            EngineError::SwapExhausted => {
                warn!(action, "no question left to swap with");
                sse_events::broadcast_notice(&self.hub, NoticeLevel::Warning, SWAP_EXHAUSTED_NOTICE);
            }
            err => warn!(action, error = %err, "command dropped"),
        }
    }

    fn on_outcome(&mut self, outcome: CommandOutcome) {
        match outcome {
            CommandOutcome::StartTimer => {
                if self
                    .question_timer
                    .start(self.tick_tx.clone(), TimerTick::Question)
                {
                    self.broadcast_question_timer();
                }
            }
            CommandOutcome::StopTimer => {
                self.question_timer.stop();
                self.broadcast_question_timer();
            }
            CommandOutcome::Lifeline(outcome) => self.on_lifeline(outcome),
            CommandOutcome::PollResults(tally) => self.show_poll_results(tally),
            CommandOutcome::Question(load) => self.on_load(load),
            CommandOutcome::Switched(outcome) => self.on_switched(outcome),
            CommandOutcome::Quit(end) => self.show_game_end(&end),
            CommandOutcome::Marked(outcome) => self.on_marked(outcome),
        }
    }

    fn on_switched(&mut self, outcome: SwitchOutcome) {
        match outcome {
            SwitchOutcome::Loaded(load) => self.on_load(load),
            SwitchOutcome::Redisplayed(level) => self.show_question(&level, true),
            SwitchOutcome::Finished(end) => self.show_game_end(&end),
        }
    }

    fn on_load(&mut self, load: QuestionLoad) {
        match load {
            QuestionLoad::Shown(level) => self.show_question(&level, false),
            QuestionLoad::Won(end) => self.show_game_end(&end),
        }
    }

    fn on_lifeline(&mut self, outcome: LifelineOutcome) {
        match outcome {
            LifelineOutcome::FiftyFifty { eliminated } => {
                if let Some(stage) = self.engine.stage() {
                    sse_events::broadcast_eliminated(
                        &self.hub,
                        &OptionsEliminatedEvent {
                            question_id: stage.question_id,
                            eliminated,
                        },
                    );
                }
            }
            LifelineOutcome::Swapped { from, question } => {
                info!(from, to = question.id, "question swapped");
                self.show_question(&question, false);
            }
            LifelineOutcome::PollOpened {
                question_id,
                user_id,
            } => self.open_poll(question_id, user_id),
            LifelineOutcome::DoubleDipArmed => {}
        }
        self.broadcast_lifelines();
    }

    fn on_marked(&mut self, outcome: MarkOutcome) {
        self.question_timer.stop();
        let amount_won = self
            .engine
            .current_user()
            .map(|user| user.progress.amount_won)
            .unwrap_or(0);
        sse_events::broadcast_answer(
            &self.hub,
            &AnswerRevealEvent {
                question_id: outcome.question_id,
                selected: outcome.selected,
                correct_answer: outcome.correct_answer,
                marked: outcome.marked,
                correct: outcome.selected == outcome.correct_answer,
                second_chance: matches!(outcome.resolution, Resolution::SecondChance { .. }),
                amount_won,
            },
        );

        match outcome.resolution {
            Resolution::Correct { amount } => {
                info!(question_id = outcome.question_id, amount, "answer resolved correct");
                self.broadcast_lifelines();
            }
            Resolution::SecondChance { disabled } => {
                debug!(%disabled, "waiting for the second attempt");
                self.broadcast_lifelines();
            }
            Resolution::GameOver(end) => self.show_game_end(&end),
        }
    }

    fn select(&mut self, option: OptionKey) -> Result<SelectionEcho, EngineError> {
        let echo = self.engine.select_option(option)?;
        self.question_timer.stop();
        self.broadcast_question_timer();
        sse_events::broadcast_selection(
            &self.hub,
            &SelectionEvent {
                user_id: echo.user_id,
                question_id: echo.question_id,
                option,
            },
        );
        if let Err(err) = self.channel.publish(Topic::AnswerSelected, &echo) {
            warn!(error = %err, "failed to publish selection echo");
        }
        Ok(echo)
    }

    fn handle_tick(&mut self, tick: TimerTick) {
        match tick {
            TimerTick::Question(generation) => match self.question_timer.tick(generation) {
                TickOutcome::Stale => {}
                TickOutcome::Running { .. } => self.broadcast_question_timer(),
                TickOutcome::Expired => {
                    self.broadcast_question_timer();
                    match self.engine.time_out() {
                        Ok(end) => {
                            self.show_game_end(&end);
                            self.publish_progress();
                        }
                        Err(err) => debug!(error = %err, "countdown expired without a question"),
                    }
                }
            },
            TimerTick::Poll(generation) => match self.poll_timer.tick(generation) {
                TickOutcome::Stale => {}
                TickOutcome::Running { remaining } => {
                    sse_events::broadcast_timer(
                        &self.hub,
                        &TimerEvent {
                            timer: TimerKind::Poll,
                            remaining,
                            running: true,
                            pulse: false,
                        },
                    );
                }
                TickOutcome::Expired => {
                    info!("poll invite expired");
                    self.poll = None;
                    sse_events::broadcast_poll_closed(&self.hub, PollCloseReason::Expired);
                }
            },
        }
    }

    fn show_question(&mut self, level: &QuestionLevel, redisplay: bool) {
        self.question_timer.reset();
        self.close_poll(PollCloseReason::Closed);

        let Some(user) = self.engine.current_user() else {
            return;
        };
        let stage = self.engine.stage();
        let level_id = user.progress.current_question_level_id;
        sse_events::broadcast_question_shown(
            &self.hub,
            &QuestionShownEvent {
                user_id: user.id,
                user_name: user.name.clone(),
                level_id,
                question: QuestionView::from(level),
                eliminated: stage.map(|stage| stage.eliminated.clone()).unwrap_or_default(),
                disabled: stage.map(|stage| stage.disabled.clone()).unwrap_or_default(),
                money_tree: money_tree(self.engine.levels(), Some(level_id)),
                seconds: self.question_timer.remaining(),
                redisplay,
            },
        );
        self.broadcast_question_timer();
        self.broadcast_lifelines();
    }

    fn show_game_end(&mut self, end: &GameEnd) {
        self.question_timer.stop();
        self.close_poll(PollCloseReason::Closed);
        let title = match end.status {
            GameStatus::Won => "Congratulations!",
            _ => "Game Over!",
        };
        sse_events::broadcast_game_over(
            &self.hub,
            &GameOverEvent {
                user_id: end.user_id,
                status: end.status,
                title: title.to_string(),
                message: end.message.clone(),
                amount: end.amount,
            },
        );
        self.broadcast_lifelines();
    }

    fn open_poll(&mut self, question_id: u32, user_id: u32) {
        self.poll = Some(OpenPoll {
            question_id,
            user_id,
        });
        self.poll_timer.restart(self.tick_tx.clone(), TimerTick::Poll);
        let url = self.settings.poll_url(question_id, user_id);
        info!(question_id, user_id, %url, "audience poll opened");
        sse_events::broadcast_poll_invite(
            &self.hub,
            &PollInviteEvent {
                question_id,
                user_id,
                url,
                expires_in_seconds: self.settings.poll_seconds,
            },
        );
    }

    fn close_poll(&mut self, reason: PollCloseReason) -> bool {
        let Some(poll) = self.poll.take() else {
            return false;
        };
        self.poll_timer.reset();
        debug!(question_id = poll.question_id, user_id = poll.user_id, ?reason, "poll invite closed");
        sse_events::broadcast_poll_closed(&self.hub, reason);
        true
    }

    fn show_poll_results(&mut self, tally: PollTally) {
        self.close_poll(PollCloseReason::Results);
        info!(total = tally.total(), "showing poll results");
        sse_events::broadcast_poll_results(&self.hub, &PollResultsEvent::from(tally));
    }

    fn broadcast_question_timer(&self) {
        let remaining = self.question_timer.remaining();
        let running = self.question_timer.is_running();
        sse_events::broadcast_timer(
            &self.hub,
            &TimerEvent {
                timer: TimerKind::Question,
                remaining,
                running,
                pulse: running && remaining <= PULSE_THRESHOLD,
            },
        );
    }

    fn broadcast_lifelines(&self) {
        let Some(user) = self.engine.current_user() else {
            return;
        };
        sse_events::broadcast_lifelines(
            &self.hub,
            &LifelinesEvent {
                user_id: user.id,
                lifelines_used: user.progress.lifelines_used.clone(),
                double_dip_active: self.double_dip_active(),
            },
        );
    }

    fn publish_progress(&self) {
        let Some(echo) = self.engine.progress_echo() else {
            return;
        };
        if let Err(err) = self.channel.publish(Topic::GameStateUpdate, &echo) {
            warn!(error = %err, "failed to publish progress echo");
        }
    }

    fn double_dip_active(&self) -> bool {
        self.engine
            .stage()
            .is_some_and(|stage| stage.double_dip != DoubleDip::Inactive)
    }

    fn snapshot(&self) -> DisplaySnapshot {
        let user = self.engine.current_user();
        let stage = self.engine.stage();
        let level_id = user.map(|user| user.progress.current_question_level_id);
        DisplaySnapshot {
            user: user.map(UserSummary::from),
            question: self.engine.displayed_question().map(QuestionView::from),
            level_id,
            eliminated: stage.map(|stage| stage.eliminated.clone()).unwrap_or_default(),
            disabled: stage.map(|stage| stage.disabled.clone()).unwrap_or_default(),
            selection: stage.and_then(|stage| stage.selection),
            resolved: stage.is_some_and(|stage| stage.resolved),
            double_dip_active: self.double_dip_active(),
            timer_remaining: self.question_timer.remaining(),
            timer_running: self.question_timer.is_running(),
            poll_open: self.poll.is_some(),
            money_tree: money_tree(self.engine.levels(), level_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dto::protocol::{AdminCommand, MarkResult, ProgressEcho},
        dto::sse::ServerEvent,
        services::game_engine::tests::engine,
        state::channel::{BroadcastChannel, LocalChannel},
    };
    use tokio::sync::broadcast;

    struct Harness {
        display: DisplayHandle,
        admin: ChannelHandle,
        channel: Arc<dyn BroadcastChannel>,
        events: broadcast::Receiver<ServerEvent>,
    }

    fn harness(question_seconds: u32) -> Harness {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(64));
        let hub = SseHub::new(256);
        let events = hub.subscribe();
        let display = spawn(
            engine(),
            ChannelHandle::new(channel.clone()),
            hub,
            DisplaySettings {
                question_seconds,
                poll_seconds: 60,
                public_base_url: "http://quiz.local/".into(),
            },
        );
        Harness {
            display,
            admin: ChannelHandle::new(channel.clone()),
            channel,
            events,
        }
    }

    impl Harness {
        fn send(&self, command: AdminCommand, user_id: u32) {
            self.admin
                .publish(Topic::AdminCommand, &AdminMessage::new(command, Some(user_id)))
                .unwrap();
        }

        fn echo(&self) -> Option<ProgressEcho> {
            self.channel
                .read(Topic::GameStateUpdate)
                .map(|raw| serde_json::from_str(&raw).unwrap())
        }

        async fn wait_for(&self, check: impl Fn(&DisplaySnapshot) -> bool) -> DisplaySnapshot {
            for _ in 0..100 {
                let snapshot = self.display.snapshot().await.unwrap();
                if check(&snapshot) {
                    return snapshot;
                }
                tokio::task::yield_now().await;
            }
            panic!("display never reached the expected state");
        }

        async fn next_event(&mut self, name: &str) -> ServerEvent {
            loop {
                let event = self.events.recv().await.unwrap();
                if event.event.as_deref() == Some(name) {
                    return event;
                }
            }
        }
    }

    #[test]
    fn poll_links_carry_question_and_user() {
        let settings = DisplaySettings {
            question_seconds: 60,
            poll_seconds: 60,
            public_base_url: "http://quiz.local/".into(),
        };
        assert_eq!(
            settings.poll_url(4, 2),
            "http://quiz.local/poll.html?questionId=4&userId=2"
        );
    }

    #[tokio::test]
    async fn first_contestant_is_put_on_screen_at_startup() {
        let harness = harness(60);
        let snapshot = harness.wait_for(|s| s.question.is_some()).await;

        assert_eq!(snapshot.user.map(|user| user.id), Some(1));
        assert_eq!(snapshot.question.map(|q| q.id), Some(1));
        assert!(!snapshot.timer_running);
        assert_eq!(snapshot.timer_remaining, 60);

        let echo = harness.echo().unwrap();
        assert_eq!(echo.user_id, 1);
        assert_eq!(echo.progress.game_status, GameStatus::Active);
        assert_eq!(echo.asked_question_ids, vec![1]);
    }

    #[tokio::test]
    async fn selection_then_mark_scores_and_echoes() {
        let harness = harness(60);
        harness.wait_for(|s| s.question.is_some()).await;

        let echo = harness.display.select_option(OptionKey::A).await.unwrap();
        assert_eq!(echo.question_id, 1);
        let selected: SelectionEcho =
            serde_json::from_str(&harness.channel.read(Topic::AnswerSelected).unwrap()).unwrap();
        assert_eq!(selected.selected_option, OptionKey::A);

        harness.send(
            AdminCommand::MarkAnswer {
                result: MarkResult::Incorrect,
            },
            1,
        );
        let snapshot = harness.wait_for(|s| s.resolved).await;
        assert_eq!(snapshot.selection, None);

        let echo = harness.echo().unwrap();
        assert_eq!(echo.progress.amount_won, 100);
        assert_eq!(echo.progress.game_status, GameStatus::Active);
    }

    #[tokio::test]
    async fn second_selection_is_locked() {
        let harness = harness(60);
        harness.wait_for(|s| s.question.is_some()).await;

        harness.display.select_option(OptionKey::B).await.unwrap();
        let err = harness.display.select_option(OptionKey::C).await.unwrap_err();
        assert!(matches!(
            err,
            DisplayError::Engine(EngineError::SelectionLocked(OptionKey::B))
        ));
    }

    #[tokio::test]
    async fn commands_for_another_contestant_are_ignored() {
        let harness = harness(60);
        harness.wait_for(|s| s.question.is_some()).await;

        harness.send(AdminCommand::ActivateDoubleDip, 2);
        harness.send(AdminCommand::StartTimer, 1);
        let snapshot = harness.wait_for(|s| s.timer_running).await;
        assert!(!snapshot.double_dip_active);
    }

    #[tokio::test]
    async fn malformed_admin_command_does_not_stop_the_display() {
        let harness = harness(60);
        harness.wait_for(|s| s.question.is_some()).await;

        let origin = harness.admin.origin();
        harness
            .channel
            .write(origin, Topic::AdminCommand, "not json".into());
        harness.channel.write(
            origin,
            Topic::AdminCommand,
            r#"{"action":"launchConfetti","timestamp":1}"#.into(),
        );
        harness.send(AdminCommand::StartTimer, 1);

        let snapshot = harness.wait_for(|s| s.timer_running).await;
        assert_eq!(snapshot.question.map(|q| q.id), Some(1));
    }

    #[tokio::test]
    async fn swap_replaces_the_question_once() {
        let harness = harness(60);
        harness.wait_for(|s| s.question.is_some()).await;

        harness.send(AdminCommand::ActivateSwapQuestion, 1);
        harness.wait_for(|s| s.question.as_ref().is_some_and(|q| q.id == 2)).await;

        let echo = harness.echo().unwrap();
        assert!(echo.progress.lifelines_used.swap_question);
        assert_eq!(echo.current_question_id, Some(2));
        assert_eq!(echo.progress.current_question_level_id, 1);

        harness.send(AdminCommand::ActivateSwapQuestion, 1);
        harness.send(AdminCommand::StartTimer, 1);
        let snapshot = harness.wait_for(|s| s.timer_running).await;
        assert_eq!(snapshot.question.map(|q| q.id), Some(2));
    }

    #[tokio::test]
    async fn audience_poll_invite_can_be_closed() {
        let mut harness = harness(60);
        harness.wait_for(|s| s.question.is_some()).await;

        harness.send(AdminCommand::ActivateAudiencePoll, 1);
        harness.wait_for(|s| s.poll_open).await;
        let invite = harness.next_event("display.poll_invite").await;
        assert!(invite.data.contains("poll.html?questionId=1&userId=1"));

        assert!(harness.display.close_poll().await.unwrap());
        assert!(!harness.display.close_poll().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_ends_the_game() {
        let mut harness = harness(3);
        harness.wait_for(|s| s.question.is_some()).await;

        harness.send(AdminCommand::StartTimer, 1);
        let over = harness.next_event("display.game_over").await;
        assert!(over.data.contains("\"status\":\"gameover\""));

        let echo = harness.echo().unwrap();
        assert_eq!(echo.progress.game_status, GameStatus::GameOver);
        assert_eq!(echo.progress.amount_won, 0);
    }
}
