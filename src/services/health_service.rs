use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `ok` while a show session runs, `degraded` when the fixtures failed.
pub fn health_status(state: &SharedState) -> HealthResponse {
    if state.is_degraded() {
        let reason = state.fixture_error().map(str::to_string);
        warn!(reason = ?reason, "health check in degraded mode");
        HealthResponse::degraded(reason)
    } else {
        HealthResponse::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn degraded_state_reports_the_fixture_error() {
        let state = AppState::degraded(AppConfig::default(), "bad questions".into());
        let health = health_status(&state);
        assert_eq!(health.status, "degraded");
        assert_eq!(health.reason.as_deref(), Some("bad questions"));
    }

    #[tokio::test]
    async fn running_session_is_ok() {
        let state = crate::state::tests::shared_state();
        assert_eq!(health_status(&state).status, "ok");
    }
}
