//! Admin control panel logic. The admin never mutates contestant progress: it turns
//! operator intent into commands on the channel and mirrors what the display echoes
//! back.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        admin::{
            AdminQuestionView, CommandAccepted, PollTallyResponse, QuestionViewedEvent,
            SelectionUpdatedEvent, UserSummary, UserUpdatedEvent, UsersResponse,
        },
        display::{MoneyLevelView, money_tree},
        protocol::{
            self, AdminCommand, AdminMessage, PollTally, PollVote, ProgressEcho, ProtocolError,
            SelectionEcho,
        },
    },
    services::sse_events,
    state::{
        SseHub,
        channel::{ChannelHandle, ChannelMessage, ChannelSubscription, Topic},
        game::{QuestionBank, QuestionLevel, User},
    },
};

/// Errors raised by admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// No contestant is selected.
    #[error("no contestant selected")]
    NoUserSelected,
    /// The contestant does not exist.
    #[error("contestant {0} not found")]
    UnknownUser(u32),
    /// The question does not exist.
    #[error("question {0} not found")]
    UnknownQuestion(u32),
    /// The tally was collected for another question than the one being played.
    #[error("poll tally tracks question {viewed:?} but the game shows {live:?}")]
    StalePoll {
        /// Question the tally belongs to.
        viewed: Option<u32>,
        /// Question on the display.
        live: Option<u32>,
    },
    /// The command could not be written on the channel.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// What the mirror learnt from a progress echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorUpdate {
    /// The echo concerned the selected contestant and needs a full re-render.
    pub selected: bool,
    /// The tracked poll question moved, and the tally was reset.
    pub question_changed: bool,
}

/// Read-mostly copy of the contestants, the viewed question and the poll tally.
#[derive(Debug, Clone)]
pub struct AdminMirror {
    levels: Vec<QuestionLevel>,
    users: IndexMap<u32, UserSummary>,
    live_questions: HashMap<u32, u32>,
    asked: Vec<u32>,
    selected_user: Option<u32>,
    viewed_question: Option<u32>,
    tally: PollTally,
    last_selection: Option<SelectionEcho>,
}

impl AdminMirror {
    /// Mirror seeded from the fixtures, first contestant selected.
    pub fn new(bank: &QuestionBank, users: &[User]) -> Self {
        let users: IndexMap<u32, UserSummary> = users
            .iter()
            .map(|user| (user.id, UserSummary::from(user)))
            .collect();
        let selected_user = users.keys().next().copied();
        let mut asked: Vec<u32> = users
            .values()
            .flat_map(|user| user.progress.questions_attempted.iter().copied())
            .collect();
        asked.sort_unstable();
        asked.dedup();

        Self {
            levels: bank.levels.clone(),
            users,
            live_questions: HashMap::new(),
            asked,
            selected_user,
            viewed_question: None,
            tally: PollTally::default(),
            last_selection: None,
        }
    }

    /// Every mirrored contestant.
    pub fn users(&self) -> UsersResponse {
        UsersResponse {
            users: self.users.values().cloned().collect(),
            selected_user_id: self.selected_user,
        }
    }

    /// One mirrored contestant.
    pub fn user(&self, user_id: u32) -> Result<&UserSummary, AdminError> {
        self.users
            .get(&user_id)
            .ok_or(AdminError::UnknownUser(user_id))
    }

    /// Question the display shows to `user_id`, as last echoed.
    pub fn live_question(&self, user_id: u32) -> Option<u32> {
        self.live_questions.get(&user_id).copied()
    }

    /// Question the poll tally is tracked for.
    pub fn viewed_question(&self) -> Option<u32> {
        self.viewed_question
    }

    /// Last option the player clicked.
    pub fn last_selection(&self) -> Option<&SelectionEcho> {
        self.last_selection.as_ref()
    }

    /// Select a contestant and build the matching `switchUser` command.
    pub fn select_user(&mut self, user_id: u32) -> Result<AdminMessage, AdminError> {
        if !self.users.contains_key(&user_id) {
            return Err(AdminError::UnknownUser(user_id));
        }
        self.selected_user = Some(user_id);
        self.last_selection = None;
        if let Some(live) = self.live_question(user_id) {
            self.track_question(live);
        }
        Ok(AdminMessage::new(AdminCommand::SwitchUser, Some(user_id)))
    }

    /// Address `command` to the selected contestant.
    pub fn command(&mut self, command: AdminCommand) -> Result<AdminMessage, AdminError> {
        let user_id = self.selected_user.ok_or(AdminError::NoUserSelected)?;
        match &command {
            AdminCommand::ActivateAudiencePoll => {
                self.tally = PollTally::default();
                if let Some(live) = self.live_question(user_id) {
                    self.viewed_question = Some(live);
                }
            }
            AdminCommand::LoadNextQuestion | AdminCommand::MarkAnswer { .. } => {
                self.last_selection = None;
            }
            _ => {}
        }
        Ok(AdminMessage::new(command, Some(user_id)))
    }

    /// Build `showPollResults`, refusing when the tally belongs to another question.
    pub fn poll_results(&self) -> Result<AdminMessage, AdminError> {
        let user_id = self.selected_user.ok_or(AdminError::NoUserSelected)?;
        let live = self.live_question(user_id);
        if live.is_none() || live != self.viewed_question {
            return Err(AdminError::StalePoll {
                viewed: self.viewed_question,
                live,
            });
        }
        Ok(AdminMessage::new(
            AdminCommand::ShowPollResults {
                data: Some(self.tally),
            },
            Some(user_id),
        ))
    }

    /// Store an echoed progress record. Echoes for unknown contestants are kept too.
    pub fn apply_progress(&mut self, echo: ProgressEcho) -> MirrorUpdate {
        let user_id = echo.user_id;
        match self.users.get_mut(&user_id) {
            Some(user) => user.progress = echo.progress,
            None => {
                debug!(user_id, "progress echo for an unknown contestant");
                self.users.insert(
                    user_id,
                    UserSummary {
                        id: user_id,
                        name: format!("Contestant {user_id}"),
                        progress: echo.progress,
                    },
                );
            }
        }
        self.asked = echo.asked_question_ids;
        if let Some(question_id) = echo.current_question_id {
            self.live_questions.insert(user_id, question_id);
        }

        let selected = self.selected_user == Some(user_id);
        let question_changed = match echo.current_question_id {
            Some(question_id) if selected => self.track_question(question_id),
            _ => false,
        };
        MirrorUpdate {
            selected,
            question_changed,
        }
    }

    /// Store the player's click.
    pub fn apply_selection(&mut self, echo: SelectionEcho) {
        self.last_selection = Some(echo);
    }

    /// Credit a vote when it targets the tracked question. Returns whether it counted.
    pub fn apply_vote(&mut self, vote: &PollVote) -> bool {
        if self.viewed_question != Some(vote.question_id) {
            return false;
        }
        self.tally.record(vote.option);
        true
    }

    /// Switch the viewer to `question_id`, resetting the tally when it changes.
    pub fn view_question(&mut self, question_id: u32) -> Result<AdminQuestionView, AdminError> {
        let level = self
            .levels
            .iter()
            .find(|level| level.id == question_id)
            .cloned()
            .ok_or(AdminError::UnknownQuestion(question_id))?;
        self.track_question(question_id);
        Ok(AdminQuestionView::new(
            &level,
            self.asked.contains(&question_id),
        ))
    }

    /// Current tally with percentages.
    pub fn tally(&self) -> PollTallyResponse {
        PollTallyResponse {
            question_id: self.viewed_question,
            votes: self.tally,
            percentages: self.tally.percentages(),
            total: self.tally.total(),
        }
    }

    /// Money tree of the selected contestant.
    pub fn money_tree(&self) -> Vec<MoneyLevelView> {
        let current = self
            .selected_user
            .and_then(|id| self.users.get(&id))
            .map(|user| user.progress.current_question_level_id)
            .filter(|level| *level > 0);
        money_tree(&self.levels, current)
    }

    fn user_event(&self, user_id: u32, selected: bool) -> Option<UserUpdatedEvent> {
        let user = self.users.get(&user_id)?;
        Some(UserUpdatedEvent {
            user: user.clone(),
            selected,
            current_question_id: self.live_question(user_id),
            asked_question_ids: self.asked.clone(),
        })
    }

    fn track_question(&mut self, question_id: u32) -> bool {
        if self.viewed_question == Some(question_id) {
            return false;
        }
        self.viewed_question = Some(question_id);
        self.tally = PollTally::default();
        true
    }
}

/// Shared admin front used by the REST routes; a background task keeps the mirror fresh.
#[derive(Clone)]
pub struct AdminDispatcher {
    mirror: Arc<RwLock<AdminMirror>>,
    channel: ChannelHandle,
    hub: SseHub,
}

impl AdminDispatcher {
    /// Start mirroring the channel. The latest stored echo is applied right away.
    pub fn spawn(mut mirror: AdminMirror, channel: ChannelHandle, hub: SseHub) -> Self {
        let subscription = channel.subscribe();
        if let Some(raw) = channel.latest(Topic::GameStateUpdate) {
            match serde_json::from_str::<ProgressEcho>(&raw) {
                Ok(echo) => {
                    mirror.apply_progress(echo);
                }
                Err(err) => warn!(error = %err, "ignoring malformed stored progress echo"),
            }
        }

        let dispatcher = Self {
            mirror: Arc::new(RwLock::new(mirror)),
            channel,
            hub,
        };
        tokio::spawn(dispatcher.clone().listen(subscription));
        dispatcher
    }

    async fn listen(self, mut subscription: ChannelSubscription) {
        while let Some(message) = subscription.recv().await {
            self.handle_message(message).await;
        }
        debug!("admin listener stopped");
    }

    async fn handle_message(&self, message: ChannelMessage) {
        let result = match message.topic {
            Topic::GameStateUpdate => self.on_progress(&message).await,
            Topic::AnswerSelected => self.on_selection(&message).await,
            Topic::PollVote => self.on_vote(&message).await,
            Topic::AdminCommand | Topic::FffCommand | Topic::FffSubmission => Ok(()),
        };
        if let Err(err) = result {
            warn!(topic = %message.topic, error = %err, "dropping malformed channel message");
        }
    }

    async fn on_progress(&self, message: &ChannelMessage) -> Result<(), ProtocolError> {
        let echo: ProgressEcho = protocol::decode(message)?;
        let user_id = echo.user_id;
        let mut mirror = self.mirror.write().await;
        let update = mirror.apply_progress(echo);
        debug!(user_id, selected = update.selected, "progress echo mirrored");
        if let Some(event) = mirror.user_event(user_id, update.selected) {
            sse_events::broadcast_user_updated(&self.hub, &event);
        }
        if update.question_changed {
            sse_events::broadcast_poll_tally(&self.hub, &mirror.tally());
        }
        Ok(())
    }

    async fn on_selection(&self, message: &ChannelMessage) -> Result<(), ProtocolError> {
        let echo: SelectionEcho = protocol::decode(message)?;
        info!(
            user_id = echo.user_id,
            question_id = echo.question_id,
            option = %echo.selected_option,
            "player selected an option"
        );
        self.mirror.write().await.apply_selection(echo.clone());
        sse_events::broadcast_selection_updated(&self.hub, &SelectionUpdatedEvent { selection: echo });
        Ok(())
    }

    async fn on_vote(&self, message: &ChannelMessage) -> Result<(), ProtocolError> {
        let vote: PollVote = protocol::decode(message)?;
        let mut mirror = self.mirror.write().await;
        if mirror.apply_vote(&vote) {
            debug!(question_id = vote.question_id, option = %vote.option, "poll vote counted");
            sse_events::broadcast_poll_tally(&self.hub, &mirror.tally());
        } else {
            debug!(
                question_id = vote.question_id,
                tracked = ?mirror.viewed_question(),
                "poll vote for another question dropped"
            );
        }
        Ok(())
    }

    /// Every mirrored contestant.
    pub async fn users(&self) -> UsersResponse {
        self.mirror.read().await.users()
    }

    /// One mirrored contestant.
    pub async fn user(&self, user_id: u32) -> Result<UserSummary, AdminError> {
        self.mirror.read().await.user(user_id).cloned()
    }

    /// Select a contestant and put them on the display.
    pub async fn select_user(&self, user_id: u32) -> Result<CommandAccepted, AdminError> {
        let message = self.mirror.write().await.select_user(user_id)?;
        self.publish(&message)
    }

    /// Send a game or lifeline command for the selected contestant.
    pub async fn send(&self, command: AdminCommand) -> Result<CommandAccepted, AdminError> {
        let message = self.mirror.write().await.command(command)?;
        self.publish(&message)
    }

    /// Ask the display to show the collected poll tally.
    pub async fn show_poll_results(&self) -> Result<CommandAccepted, AdminError> {
        let message = self.mirror.read().await.poll_results()?;
        self.publish(&message)
    }

    /// Review any question, which also moves the poll tracking to it.
    pub async fn view_question(&self, question_id: u32) -> Result<AdminQuestionView, AdminError> {
        let mut mirror = self.mirror.write().await;
        let view = mirror.view_question(question_id)?;
        sse_events::broadcast_question_viewed(
            &self.hub,
            &QuestionViewedEvent {
                question: view.clone(),
            },
        );
        sse_events::broadcast_poll_tally(&self.hub, &mirror.tally());
        Ok(view)
    }

    /// Current poll tally.
    pub async fn poll_tally(&self) -> PollTallyResponse {
        self.mirror.read().await.tally()
    }

    /// Money tree of the selected contestant.
    pub async fn money_tree(&self) -> Vec<MoneyLevelView> {
        self.mirror.read().await.money_tree()
    }

    fn publish(&self, message: &AdminMessage) -> Result<CommandAccepted, AdminError> {
        self.channel.publish(Topic::AdminCommand, message)?;
        info!(action = message.command.action(), user_id = ?message.user_id, "admin command sent");
        Ok(CommandAccepted::from(message))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        services::game_engine::tests::{bank, user},
        state::{
            channel::{BroadcastChannel, LocalChannel},
            game::{OptionKey, UserProgress},
            state_machine::GameStatus,
        },
    };

    fn mirror() -> AdminMirror {
        AdminMirror::new(&bank(), &[user(1, "Asha"), user(2, "Ravi")])
    }

    fn echo(user_id: u32, question_id: u32, amount: u64) -> ProgressEcho {
        ProgressEcho {
            user_id,
            progress: UserProgress {
                current_question_level_id: question_id,
                questions_attempted: vec![question_id],
                amount_won: amount,
                game_status: GameStatus::Active,
                ..UserProgress::default()
            },
            asked_question_ids: vec![question_id],
            current_question_id: Some(question_id),
        }
    }

    fn vote(question_id: u32, option: OptionKey) -> PollVote {
        PollVote {
            question_id,
            option,
            participant: "Seat 7".into(),
            timestamp: 0,
        }
    }

    #[test]
    fn commands_target_the_selected_contestant() {
        let mut mirror = mirror();
        let message = mirror.command(AdminCommand::StartTimer).unwrap();
        assert_eq!(message.user_id, Some(1));

        let switch = mirror.select_user(2).unwrap();
        assert_eq!(switch.command, AdminCommand::SwitchUser);
        assert_eq!(switch.user_id, Some(2));
        assert!(matches!(mirror.select_user(9), Err(AdminError::UnknownUser(9))));
    }

    #[test]
    fn echoes_for_other_contestants_are_stored_without_rendering() {
        let mut mirror = mirror();
        let update = mirror.apply_progress(echo(2, 3, 200));

        assert!(!update.selected);
        assert!(!update.question_changed);
        assert_eq!(mirror.user(2).unwrap().progress.amount_won, 200);
        assert_eq!(mirror.viewed_question(), None);
    }

    #[test]
    fn echoes_for_unknown_contestants_are_kept() {
        let mut mirror = mirror();
        mirror.apply_progress(echo(42, 1, 0));
        assert_eq!(mirror.user(42).unwrap().name, "Contestant 42");
    }

    #[test]
    fn votes_for_another_question_leave_the_tally_unchanged() {
        let mut mirror = mirror();
        mirror.apply_progress(echo(1, 3, 200));
        assert_eq!(mirror.viewed_question(), Some(3));

        assert!(mirror.apply_vote(&vote(3, OptionKey::C)));
        assert!(!mirror.apply_vote(&vote(4, OptionKey::A)));

        let tally = mirror.tally();
        assert_eq!(tally.total, 1);
        assert_eq!(tally.votes.votes(OptionKey::C), 1);
    }

    #[test]
    fn viewing_another_question_resets_the_tally() {
        let mut mirror = mirror();
        mirror.apply_progress(echo(1, 3, 200));
        mirror.apply_vote(&vote(3, OptionKey::B));

        let view = mirror.view_question(5).unwrap();
        assert_eq!(view.id, 5);
        assert!(!view.asked);
        assert_eq!(mirror.tally().total, 0);
        assert!(matches!(
            mirror.view_question(99),
            Err(AdminError::UnknownQuestion(99))
        ));
    }

    #[test]
    fn poll_results_require_the_live_question() {
        let mut mirror = mirror();
        mirror.apply_progress(echo(1, 3, 200));
        mirror.command(AdminCommand::ActivateAudiencePoll).unwrap();
        mirror.apply_vote(&vote(3, OptionKey::D));

        let message = mirror.poll_results().unwrap();
        match message.command {
            AdminCommand::ShowPollResults { data: Some(tally) } => {
                assert_eq!(tally.votes(OptionKey::D), 1)
            }
            other => panic!("unexpected command {other:?}"),
        }

        mirror.view_question(4).unwrap();
        assert!(matches!(
            mirror.poll_results(),
            Err(AdminError::StalePoll {
                viewed: Some(4),
                live: Some(3)
            })
        ));
    }

    #[tokio::test]
    async fn dispatcher_mirrors_channel_traffic() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(32));
        let hub = SseHub::new(32);
        let mut events = hub.subscribe();
        let dispatcher = AdminDispatcher::spawn(mirror(), ChannelHandle::new(channel.clone()), hub);
        let display = ChannelHandle::new(channel.clone());

        display
            .publish(Topic::GameStateUpdate, &echo(1, 2, 100))
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("admin.user_updated"));
        assert!(event.data.contains("\"selected\":true"));
        assert_eq!(dispatcher.user(1).await.unwrap().progress.amount_won, 100);

        let accepted = dispatcher
            .send(AdminCommand::MarkAnswer {
                result: protocol::MarkResult::Correct,
            })
            .await
            .unwrap();
        assert_eq!(accepted.action, "markAnswer");
        let written: AdminMessage =
            serde_json::from_str(&channel.read(Topic::AdminCommand).unwrap()).unwrap();
        assert_eq!(written.user_id, Some(1));
    }

    #[tokio::test]
    async fn dispatcher_survives_malformed_traffic() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(32));
        let dispatcher =
            AdminDispatcher::spawn(mirror(), ChannelHandle::new(channel.clone()), SseHub::new(32));
        let display = ChannelHandle::new(channel.clone());
        let mobile = ChannelHandle::new(channel.clone());

        display
            .publish(Topic::GameStateUpdate, &echo(1, 2, 100))
            .unwrap();
        channel.write(display.origin(), Topic::GameStateUpdate, "{\"userId\":".into());
        channel.write(mobile.origin(), Topic::PollVote, "not json".into());
        mobile.publish(Topic::PollVote, &vote(2, OptionKey::A)).unwrap();

        for _ in 0..100 {
            if dispatcher.poll_tally().await.total == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let tally = dispatcher.poll_tally().await;
        assert_eq!(tally.question_id, Some(2));
        assert_eq!(tally.total, 1);
        assert_eq!(dispatcher.user(1).await.unwrap().progress.amount_won, 100);
    }

    #[tokio::test]
    async fn dispatcher_replays_the_stored_echo() {
        let channel: Arc<dyn BroadcastChannel> = Arc::new(LocalChannel::new(8));
        ChannelHandle::new(channel.clone())
            .publish(Topic::GameStateUpdate, &echo(1, 4, 300))
            .unwrap();

        let dispatcher =
            AdminDispatcher::spawn(mirror(), ChannelHandle::new(channel), SseHub::new(8));
        assert_eq!(dispatcher.user(1).await.unwrap().progress.amount_won, 300);
        assert_eq!(dispatcher.poll_tally().await.question_id, Some(4));
    }
}
