//! Game progression engine: sole owner of contestants' progress and of the set of
//! questions already asked in the session.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use rand::{rng, seq::SliceRandom};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    dto::protocol::{AdminCommand, AdminMessage, MarkResult, PollTally, ProgressEcho, SelectionEcho},
    state::{
        game::{Lifeline, OptionKey, QuestionBank, QuestionLevel, User},
        state_machine::{GameStatus, InvalidTransition, ProgressEvent},
    },
};

/// Errors raised by engine operations. None of them leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No contestant is selected.
    #[error("no contestant selected")]
    NoActiveUser,
    /// The targeted contestant does not exist.
    #[error("user `{0}` not found")]
    UnknownUser(u32),
    /// The command targets another contestant than the one on screen.
    #[error("command for user {got} ignored; user {expected} is on screen")]
    UserMismatch {
        /// Contestant on screen.
        expected: u32,
        /// Contestant named by the command.
        got: u32,
    },
    /// A required question, selection or field is absent.
    #[error("missing context: {0}")]
    MissingContext(&'static str),
    /// The lifeline was already used or cannot apply right now.
    #[error("lifeline `{0}` unavailable")]
    LifelineUnavailable(Lifeline),
    /// No unasked question is left to swap in.
    #[error("no unasked question left to swap with")]
    SwapExhausted,
    /// The option was eliminated by fifty-fifty.
    #[error("option {0} cannot be selected")]
    OptionUnavailable(OptionKey),
    /// An option is already selected and waits for the admin's verdict.
    #[error("option {0} is already selected")]
    SelectionLocked(OptionKey),
    /// The contestant's status does not allow the operation.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Second-chance state of the question on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DoubleDip {
    /// Lifeline not armed on this question.
    #[default]
    Inactive,
    /// Armed; the next wrong answer grants a second attempt.
    FirstAttempt,
    /// The second attempt is running; a wrong answer ends the game.
    SecondAttempt,
}

/// Transient state of the question currently displayed to a contestant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionStage {
    /// Question on screen.
    pub question_id: u32,
    /// Options removed by fifty-fifty.
    pub eliminated: Vec<OptionKey>,
    /// Options already answered wrong during a double dip. Shown greyed out only:
    /// `select_option` still accepts them, so repeating the wrong answer ends the game.
    pub disabled: Vec<OptionKey>,
    /// Option clicked by the player and not yet marked.
    pub selection: Option<OptionKey>,
    /// Double-dip state.
    pub double_dip: DoubleDip,
    /// Whether the question was answered, timed out or quit.
    pub resolved: bool,
}

impl QuestionStage {
    fn new(question_id: u32) -> Self {
        Self {
            question_id,
            eliminated: Vec::new(),
            disabled: Vec::new(),
            selection: None,
            double_dip: DoubleDip::Inactive,
            resolved: false,
        }
    }

    /// Whether the question still waits for an answer.
    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}

/// Final summary shown when a contestant's game ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEnd {
    /// Contestant.
    pub user_id: u32,
    /// Terminal status reached.
    pub status: GameStatus,
    /// Prize taken home.
    pub amount: u64,
    /// Human-readable summary.
    pub message: String,
}

/// Result of issuing the next question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionLoad {
    /// A fresh question is on screen.
    Shown(QuestionLevel),
    /// Nothing was left; the contestant won.
    Won(GameEnd),
}

/// How a marked answer resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Right answer; the level prize is secured.
    Correct {
        /// New `amountWon`.
        amount: u64,
    },
    /// Wrong first answer under double dip; the option is disabled.
    SecondChance {
        /// The wrong option.
        disabled: OptionKey,
    },
    /// Wrong answer; the game is over.
    GameOver(GameEnd),
}

/// Outcome of `markAnswer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkOutcome {
    /// Question that was answered.
    pub question_id: u32,
    /// Option the player had selected.
    pub selected: OptionKey,
    /// The right option.
    pub correct_answer: OptionKey,
    /// Admin verdict, used only for styling the reveal.
    pub marked: MarkResult,
    /// What happened to the contestant.
    pub resolution: Resolution,
}

/// Effect of a lifeline activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifelineOutcome {
    /// Two wrong options were removed.
    FiftyFifty {
        /// Removed options.
        eliminated: Vec<OptionKey>,
    },
    /// The question on screen was replaced.
    Swapped {
        /// Id of the question swapped away.
        from: u32,
        /// The replacement.
        question: QuestionLevel,
    },
    /// The audience poll is open for the question on screen.
    PollOpened {
        /// Question to vote on.
        question_id: u32,
        /// Contestant being helped.
        user_id: u32,
    },
    /// Double dip is armed.
    DoubleDipArmed,
}

/// What the display shows after switching contestant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The contestant received a new question or won.
    Loaded(QuestionLoad),
    /// The question already issued to the contestant is shown again.
    Redisplayed(QuestionLevel),
    /// The contestant already finished; nothing changed.
    Finished(GameEnd),
}

/// Typed result of one admin command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The question countdown should resume.
    StartTimer,
    /// The question countdown should pause.
    StopTimer,
    /// A lifeline was applied.
    Lifeline(LifelineOutcome),
    /// Poll results should be displayed.
    PollResults(PollTally),
    /// The next question was issued.
    Question(QuestionLoad),
    /// Another contestant is on screen.
    Switched(SwitchOutcome),
    /// The contestant walked away.
    Quit(GameEnd),
    /// The pending selection was resolved.
    Marked(MarkOutcome),
}

/// Owns every contestant's progress and the global asked set.
#[derive(Debug, Clone)]
pub struct GameEngine {
    bank: QuestionBank,
    users: IndexMap<u32, User>,
    asked: BTreeSet<u32>,
    current_user: Option<u32>,
    stages: HashMap<u32, QuestionStage>,
}

impl GameEngine {
    /// Build the engine, rebuilding the asked set from every contestant's history.
    pub fn new(bank: QuestionBank, users: Vec<User>) -> Self {
        let asked = users
            .iter()
            .flat_map(|user| user.progress.questions_attempted.iter().copied())
            .collect();
        Self {
            bank,
            users: users.into_iter().map(|user| (user.id, user)).collect(),
            asked,
            current_user: None,
            stages: HashMap::new(),
        }
    }

    /// Question levels sorted by id.
    pub fn levels(&self) -> &[QuestionLevel] {
        &self.bank.levels
    }

    /// Registered contestants in fixture order.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Look a contestant up.
    pub fn user(&self, user_id: u32) -> Option<&User> {
        self.users.get(&user_id)
    }

    /// First registered contestant, selected at startup.
    pub fn first_user_id(&self) -> Option<u32> {
        self.users.keys().next().copied()
    }

    /// Contestant on screen.
    pub fn current_user(&self) -> Option<&User> {
        self.current_user.and_then(|id| self.users.get(&id))
    }

    /// Ids of every question issued in this session.
    pub fn asked(&self) -> &BTreeSet<u32> {
        &self.asked
    }

    /// State of the question on screen for the current contestant.
    pub fn stage(&self) -> Option<&QuestionStage> {
        self.current_user.and_then(|id| self.stages.get(&id))
    }

    /// Question on screen for the current contestant.
    pub fn displayed_question(&self) -> Option<&QuestionLevel> {
        self.stage()
            .and_then(|stage| self.bank.level(stage.question_id))
    }

    /// Whether a question is on screen and still waiting for an answer.
    pub fn has_open_question(&self) -> bool {
        self.stage().is_some_and(QuestionStage::is_open)
    }

    /// Echo describing the current contestant's progress.
    pub fn progress_echo(&self) -> Option<ProgressEcho> {
        let user = self.current_user()?;
        Some(ProgressEcho {
            user_id: user.id,
            progress: user.progress.clone(),
            asked_question_ids: self.asked.iter().copied().collect(),
            current_question_id: self.stage().map(|stage| stage.question_id),
        })
    }

    /// Dispatch an admin command to the matching operation.
    pub fn apply(&mut self, message: &AdminMessage) -> Result<CommandOutcome, EngineError> {
        if !matches!(message.command, AdminCommand::SwitchUser) {
            let current = self.current_user.ok_or(EngineError::NoActiveUser)?;
            if let Some(target) = message.user_id
                && target != current
            {
                return Err(EngineError::UserMismatch {
                    expected: current,
                    got: target,
                });
            }
        }

        match &message.command {
            AdminCommand::SwitchUser => {
                let user_id = message
                    .user_id
                    .ok_or(EngineError::MissingContext("switchUser without userId"))?;
                self.switch_user(user_id).map(CommandOutcome::Switched)
            }
            AdminCommand::StartTimer => {
                if self.has_open_question() {
                    Ok(CommandOutcome::StartTimer)
                } else {
                    Err(EngineError::MissingContext("no open question to time"))
                }
            }
            AdminCommand::StopTimer => Ok(CommandOutcome::StopTimer),
            AdminCommand::ActivateFiftyFifty => self
                .activate_lifeline(Lifeline::FiftyFifty)
                .map(CommandOutcome::Lifeline),
            AdminCommand::ActivateSwapQuestion => self
                .activate_lifeline(Lifeline::SwapQuestion)
                .map(CommandOutcome::Lifeline),
            AdminCommand::ActivateAudiencePoll => self
                .activate_lifeline(Lifeline::AudiencePoll)
                .map(CommandOutcome::Lifeline),
            AdminCommand::ActivateDoubleDip => self
                .activate_lifeline(Lifeline::DoubleDip)
                .map(CommandOutcome::Lifeline),
            AdminCommand::ShowPollResults { data } => {
                Ok(CommandOutcome::PollResults(data.unwrap_or_default()))
            }
            AdminCommand::LoadNextQuestion => {
                self.load_next_question().map(CommandOutcome::Question)
            }
            AdminCommand::QuitGame => self.quit().map(CommandOutcome::Quit),
            AdminCommand::MarkAnswer { result } => {
                self.mark_answer(*result).map(CommandOutcome::Marked)
            }
        }
    }

    /// Put `user_id` on screen and initialise their game.
    ///
    /// Unknown ids fall back to the first registered contestant.
    pub fn switch_user(&mut self, user_id: u32) -> Result<SwitchOutcome, EngineError> {
        let user_id = if self.users.contains_key(&user_id) {
            user_id
        } else {
            let fallback = self
                .first_user_id()
                .ok_or(EngineError::UnknownUser(user_id))?;
            info!(requested = user_id, fallback, "unknown user; selecting the first one");
            fallback
        };
        self.current_user = Some(user_id);

        let status = self.users[&user_id].progress.game_status;
        if status.is_terminal() {
            return Ok(SwitchOutcome::Finished(self.game_end(user_id, status)));
        }

        let redisplay = self
            .stages
            .get(&user_id)
            .filter(|stage| status == GameStatus::Active && stage.is_open())
            .and_then(|stage| self.bank.level(stage.question_id))
            .cloned();
        match redisplay {
            Some(level) => Ok(SwitchOutcome::Redisplayed(level)),
            None => self.load_next_question().map(SwitchOutcome::Loaded),
        }
    }

    /// Issue the lowest unasked question at or above the contestant's next level.
    pub fn load_next_question(&mut self) -> Result<QuestionLoad, EngineError> {
        let user_id = self.current_user.ok_or(EngineError::NoActiveUser)?;
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;

        let target = user.progress.current_question_level_id + 1;
        let next = self
            .bank
            .levels
            .iter()
            .find(|level| level.id >= target && !self.asked.contains(&level.id))
            .cloned();

        let Some(level) = next else {
            let status = user.progress.game_status.transition(ProgressEvent::Exhausted)?;
            user.progress.game_status = status;
            self.stages.remove(&user_id);
            info!(user_id, amount = user.progress.amount_won, "no question left; contestant won");
            return Ok(QuestionLoad::Won(self.game_end(user_id, status)));
        };

        let status = user
            .progress
            .game_status
            .transition(ProgressEvent::QuestionLoaded)?;
        user.progress.game_status = status;
        user.progress.current_question_level_id = level.id;
        user.progress.questions_attempted.push(level.id);
        self.asked.insert(level.id);
        self.stages.insert(user_id, QuestionStage::new(level.id));

        info!(user_id, question_id = level.id, "question issued");
        Ok(QuestionLoad::Shown(level))
    }

    /// Record the player's click on `option`.
    pub fn select_option(&mut self, option: OptionKey) -> Result<SelectionEcho, EngineError> {
        let user_id = self.current_user.ok_or(EngineError::NoActiveUser)?;
        let stage = self
            .stages
            .get_mut(&user_id)
            .filter(|stage| stage.is_open())
            .ok_or(EngineError::MissingContext("no open question on screen"))?;

        if let Some(selected) = stage.selection {
            return Err(EngineError::SelectionLocked(selected));
        }
        if stage.eliminated.contains(&option) {
            return Err(EngineError::OptionUnavailable(option));
        }

        stage.selection = Some(option);
        debug!(user_id, question_id = stage.question_id, %option, "option selected");
        Ok(SelectionEcho {
            user_id,
            question_id: stage.question_id,
            selected_option: option,
        })
    }

    /// Resolve the pending selection. Scoring follows the real answer; the admin's
    /// verdict only travels along for the reveal.
    pub fn mark_answer(&mut self, marked: MarkResult) -> Result<MarkOutcome, EngineError> {
        let user_id = self.current_user.ok_or(EngineError::NoActiveUser)?;
        let stage = self
            .stages
            .get(&user_id)
            .filter(|stage| stage.is_open())
            .ok_or(EngineError::MissingContext("no open question on screen"))?;
        let selected = stage
            .selection
            .ok_or(EngineError::MissingContext("no option selected"))?;
        let question_id = stage.question_id;
        let double_dip = stage.double_dip;
        let correct_answer = self
            .bank
            .level(question_id)
            .map(|level| level.correct_answer)
            .ok_or(EngineError::MissingContext("question missing from the bank"))?;

        let resolution = if selected == correct_answer {
            self.resolve_correct(user_id)?
        } else if double_dip == DoubleDip::FirstAttempt {
            if let Some(stage) = self.stages.get_mut(&user_id) {
                stage.double_dip = DoubleDip::SecondAttempt;
                stage.disabled.push(selected);
                stage.selection = None;
            }
            info!(user_id, question_id, %selected, "double dip second chance");
            Resolution::SecondChance { disabled: selected }
        } else {
            Resolution::GameOver(self.resolve_game_over(user_id)?)
        };

        Ok(MarkOutcome {
            question_id,
            selected,
            correct_answer,
            marked,
            resolution,
        })
    }

    /// The question countdown reached zero: resolve as a wrong answer.
    pub fn time_out(&mut self) -> Result<GameEnd, EngineError> {
        let user_id = self.current_user.ok_or(EngineError::NoActiveUser)?;
        if !self.has_open_question() {
            return Err(EngineError::MissingContext("no open question to time out"));
        }
        info!(user_id, "question timed out");
        self.resolve_game_over(user_id)
    }

    /// Walk away with the prize of the last passed level.
    pub fn quit(&mut self) -> Result<GameEnd, EngineError> {
        let user_id = self.current_user.ok_or(EngineError::NoActiveUser)?;
        if !self.stages.contains_key(&user_id) {
            return Err(EngineError::MissingContext("no question on screen"));
        }
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        let status = user.progress.game_status.transition(ProgressEvent::Quit)?;

        let last_passed = user.progress.current_question_level_id.saturating_sub(1);
        let amount = self
            .bank
            .level(last_passed)
            .map(|level| level.amount)
            .unwrap_or(0);
        user.progress.amount_won = amount;
        user.progress.game_status = status;
        if let Some(stage) = self.stages.get_mut(&user_id) {
            stage.resolved = true;
            stage.selection = None;
        }

        info!(user_id, amount, "contestant quit");
        Ok(self.game_end(user_id, status))
    }

    /// Apply `lifeline` to the question on screen. A used lifeline is a no-op error.
    pub fn activate_lifeline(&mut self, lifeline: Lifeline) -> Result<LifelineOutcome, EngineError> {
        let user_id = self.current_user.ok_or(EngineError::NoActiveUser)?;
        let user = self
            .users
            .get(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        if user.progress.game_status != GameStatus::Active
            || user.progress.lifelines_used.is_used(lifeline)
        {
            return Err(EngineError::LifelineUnavailable(lifeline));
        }
        let stage = self
            .stages
            .get(&user_id)
            .filter(|stage| stage.is_open())
            .ok_or(EngineError::LifelineUnavailable(lifeline))?;
        let question_id = stage.question_id;

        let outcome = match lifeline {
            Lifeline::FiftyFifty => {
                let correct = self
                    .bank
                    .level(question_id)
                    .map(|level| level.correct_answer)
                    .ok_or(EngineError::MissingContext("question missing from the bank"))?;
                let mut wrong: Vec<OptionKey> = OptionKey::ALL
                    .into_iter()
                    .filter(|key| *key != correct)
                    .collect();
                wrong.shuffle(&mut rng());
                wrong.truncate(2);
                wrong.sort();
                if let Some(stage) = self.stages.get_mut(&user_id) {
                    stage.eliminated = wrong.clone();
                }
                LifelineOutcome::FiftyFifty { eliminated: wrong }
            }
            Lifeline::SwapQuestion => self.swap_question(user_id, question_id)?,
            Lifeline::AudiencePoll => LifelineOutcome::PollOpened {
                question_id,
                user_id,
            },
            Lifeline::DoubleDip => {
                if let Some(stage) = self.stages.get_mut(&user_id) {
                    stage.double_dip = DoubleDip::FirstAttempt;
                }
                LifelineOutcome::DoubleDipArmed
            }
        };

        if let Some(user) = self.users.get_mut(&user_id) {
            user.progress.lifelines_used.mark_used(lifeline);
        }
        info!(user_id, %lifeline, question_id, "lifeline used");
        Ok(outcome)
    }

    /// Replace the question on screen with the next harder unasked, never-swapped one.
    fn swap_question(&mut self, user_id: u32, from: u32) -> Result<LifelineOutcome, EngineError> {
        let replacement = self
            .bank
            .levels
            .iter()
            .find(|level| level.id > from && !level.swapped && !self.asked.contains(&level.id))
            .cloned()
            .ok_or(EngineError::SwapExhausted)?;

        if let Some(original) = self.bank.levels.iter_mut().find(|level| level.id == from) {
            original.swapped = true;
        }
        // The contestant's attempted list and level stay as they are; both ids leave the pool.
        self.asked.insert(from);
        self.asked.insert(replacement.id);
        self.stages
            .insert(user_id, QuestionStage::new(replacement.id));

        Ok(LifelineOutcome::Swapped {
            from,
            question: replacement,
        })
    }

    fn resolve_correct(&mut self, user_id: u32) -> Result<Resolution, EngineError> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        let status = user
            .progress
            .game_status
            .transition(ProgressEvent::AnsweredCorrectly)?;

        let stage = self.stages.get_mut(&user_id);
        let question_id = stage
            .as_ref()
            .map(|stage| stage.question_id)
            .unwrap_or(user.progress.current_question_level_id);
        let amount = self
            .bank
            .level(question_id)
            .map(|level| level.amount)
            .unwrap_or(user.progress.amount_won);

        user.progress.amount_won = amount;
        user.progress.game_status = status;
        if let Some(stage) = stage {
            stage.resolved = true;
            stage.selection = None;
            stage.double_dip = DoubleDip::Inactive;
        }

        info!(user_id, question_id, amount, "answered correctly");
        Ok(Resolution::Correct { amount })
    }

    fn resolve_game_over(&mut self, user_id: u32) -> Result<GameEnd, EngineError> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        let status = user
            .progress
            .game_status
            .transition(ProgressEvent::AnsweredIncorrectly)?;

        let question_id = self
            .stages
            .get(&user_id)
            .map(|stage| stage.question_id)
            .unwrap_or(user.progress.current_question_level_id);
        let amount = milestone_amount_below(&self.bank.levels, question_id);
        user.progress.amount_won = amount;
        user.progress.game_status = status;
        if let Some(stage) = self.stages.get_mut(&user_id) {
            stage.resolved = true;
            stage.selection = None;
            stage.double_dip = DoubleDip::Inactive;
        }

        info!(user_id, amount, "game over");
        Ok(self.game_end(user_id, status))
    }

    fn game_end(&self, user_id: u32, status: GameStatus) -> GameEnd {
        let (name, amount) = self
            .users
            .get(&user_id)
            .map(|user| (user.name.as_str(), user.progress.amount_won))
            .unwrap_or(("Contestant", 0));
        let prize = format_amount(amount);
        let message = match status {
            GameStatus::Won if self.asked.len() >= self.bank.levels.len() => {
                format!("Congratulations {name}! Every question has been answered. You win ₹{prize}.")
            }
            GameStatus::Won => format!("Congratulations {name}! You've completed the game with ₹{prize}."),
            GameStatus::Quit => format!("{name} has quit the game, winning ₹{prize}."),
            GameStatus::GameOver => {
                format!("Sorry, that was incorrect. {name} walks away with ₹{prize}.")
            }
            GameStatus::Ready | GameStatus::Active => format!("{name} holds ₹{prize}."),
        };
        GameEnd {
            user_id,
            status,
            amount,
            message,
        }
    }
}

/// Prize of the highest milestone strictly below `level_id`, 0 when none.
pub fn milestone_amount_below(levels: &[QuestionLevel], level_id: u32) -> u64 {
    levels
        .iter()
        .filter(|level| level.milestone && level.id < level_id)
        .max_by_key(|level| level.id)
        .map(|level| level.amount)
        .unwrap_or(0)
}

/// Format a prize with thousands separators, e.g. `1,000,000`.
pub fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(digit);
    }
    formatted
}
