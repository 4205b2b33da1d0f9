pub mod channel;
pub mod game;
mod sse;
pub mod state_machine;

use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::{
    config::AppConfig,
    dao::fixtures::{FixtureRepository, Fixtures},
    error::ServiceError,
    services::{
        admin_service::{AdminDispatcher, AdminMirror},
        display_service::{self, DisplayHandle, DisplaySettings},
        fff_service::{self, FffHandle, FffSettings},
        game_engine::GameEngine,
        mobile_service::PollBallots,
    },
    state::{
        channel::{BroadcastChannel, ChannelHandle, LocalChannel},
        game::QuestionBank,
    },
};

pub use self::sse::{AdminDesk, SseHub};
use self::sse::SseState;

pub type SharedState = Arc<AppState>;

/// Handles of the tasks running one show, present once the fixtures loaded.
pub struct Session {
    /// Display screen task.
    pub display: DisplayHandle,
    /// Admin mirror and command sender.
    pub admin: AdminDispatcher,
    /// Fastest-finger-first coordinator.
    pub fff: FffHandle,
    /// Question bank, read by the mobile ballots.
    pub bank: QuestionBank,
}

/// Central application state: the shared channel, SSE hubs and the running session.
pub struct AppState {
    config: Arc<AppConfig>,
    channel: Arc<dyn BroadcastChannel>,
    sse: SseState,
    session: Option<Session>,
    fixture_error: Option<String>,
    ballots: PollBallots,
}

impl AppState {
    /// Load the fixtures and start the show tasks.
    ///
    /// A fixture failure leaves the application in degraded mode: streams and health
    /// keep working, game routes answer `503`.
    pub async fn new(config: AppConfig) -> SharedState {
        let repository = FixtureRepository::new(&config.questions_path, &config.users_path);
        match repository.load().await {
            Ok(fixtures) => Self::with_fixtures(config, fixtures),
            Err(err) => {
                error!(error = %err, "failed to load fixtures; entering degraded mode");
                Self::degraded(config, err.to_string())
            }
        }
    }

    /// Start a session over already loaded fixtures. Must run inside a Tokio runtime.
    pub fn with_fixtures(config: AppConfig, fixtures: Fixtures) -> SharedState {
        let (mut state, channel) = Self::base(config);
        let Fixtures { bank, users } = fixtures;

        let admin = AdminDispatcher::spawn(
            AdminMirror::new(&bank, &users),
            ChannelHandle::new(channel.clone()),
            state.sse.admin().hub().clone(),
        );
        let fff = fff_service::spawn(
            bank.fff_question.clone(),
            ChannelHandle::new(channel.clone()),
            state.sse.studio().clone(),
            FffSettings {
                seconds: state.config.fff_seconds,
                leaderboard_size: state.config.leaderboard_size,
                join_url: format!("{}/mobile.html?round=fff", state.config.public_base_url),
            },
        );
        let display = display_service::spawn(
            GameEngine::new(bank.clone(), users),
            ChannelHandle::new(channel),
            state.sse.studio().clone(),
            DisplaySettings {
                question_seconds: state.config.question_seconds,
                poll_seconds: state.config.poll_seconds,
                public_base_url: state.config.public_base_url.clone(),
            },
        );

        info!(levels = bank.levels.len(), "show session started");
        state.session = Some(Session {
            display,
            admin,
            fff,
            bank,
        });
        Arc::new(state)
    }

    /// State without a session, reporting `reason` on health checks.
    pub fn degraded(config: AppConfig, reason: String) -> SharedState {
        let (mut state, _) = Self::base(config);
        state.fixture_error = Some(reason);
        Arc::new(state)
    }

    fn base(config: AppConfig) -> (Self, Arc<dyn BroadcastChannel>) {
        let channel: Arc<dyn BroadcastChannel> =
            Arc::new(LocalChannel::new(config.channel_capacity));
        let ballots = PollBallots::new(Duration::from_secs(u64::from(config.poll_seconds)));
        let sse = SseState::new(&config);
        let state = Self {
            config: Arc::new(config),
            channel: channel.clone(),
            sse,
            session: None,
            fixture_error: None,
            ballots,
        };
        (state, channel)
    }

    /// Runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// The shared broadcast channel; wrap it in a [`ChannelHandle`] to take part.
    pub fn channel(&self) -> Arc<dyn BroadcastChannel> {
        self.channel.clone()
    }

    /// The running session, or [`ServiceError::Degraded`] when the fixtures failed.
    pub fn require_session(&self) -> Result<&Session, ServiceError> {
        self.session.as_ref().ok_or(ServiceError::Degraded)
    }

    /// Whether the fixtures failed to load.
    pub fn is_degraded(&self) -> bool {
        self.session.is_none()
    }

    /// Why the fixtures failed to load.
    pub fn fixture_error(&self) -> Option<&str> {
        self.fixture_error.as_deref()
    }

    /// Mobile poll ballots.
    pub fn ballots(&self) -> &PollBallots {
        &self.ballots
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.studio()
    }

    /// Broadcast hub used for the admin SSE stream.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin().hub()
    }

    /// Admin hub with the lease that keeps a single admin SSE subscriber at a time.
    pub fn admin_desk(&self) -> &AdminDesk {
        self.sse.admin()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::game_engine::tests::{bank, user};

    /// A running session over the engine test fixtures.
    pub(crate) fn shared_state() -> SharedState {
        AppState::with_fixtures(
            AppConfig::default(),
            Fixtures {
                bank: bank(),
                users: vec![user(1, "Asha"), user(2, "Ravi")],
            },
        )
    }

    #[tokio::test]
    async fn fixtures_start_a_session() {
        let state = shared_state();
        assert!(!state.is_degraded());
        let session = state.require_session().unwrap();
        assert_eq!(session.bank.levels.len(), 6);
    }

    #[tokio::test]
    async fn missing_fixtures_degrade() {
        let config = AppConfig {
            questions_path: "does/not/exist.json".into(),
            ..AppConfig::default()
        };
        let state = AppState::new(config).await;
        assert!(state.is_degraded());
        assert!(state.fixture_error().is_some());
        assert!(matches!(
            state.require_session(),
            Err(ServiceError::Degraded)
        ));
    }
}
