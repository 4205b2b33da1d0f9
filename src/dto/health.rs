use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Why the fixtures failed to load, in degraded mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// RFC 3339 time of the check.
    pub checked_at: String,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            reason: None,
            checked_at: super::format_system_time(std::time::SystemTime::now()),
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(reason: Option<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            reason,
            checked_at: super::format_system_time(std::time::SystemTime::now()),
        }
    }
}
