//! Application-level configuration loading: fixture paths, timers and public URLs.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "KBC_SHOW_CONFIG_PATH";

const DEFAULT_QUESTIONS_PATH: &str = "data/questions.json";
const DEFAULT_USERS_PATH: &str = "data/users.json";
const DEFAULT_QUESTION_SECONDS: u32 = 60;
const DEFAULT_POLL_SECONDS: u32 = 60;
const DEFAULT_FFF_SECONDS: u32 = 60;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_SSE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Question bank fixture.
    pub questions_path: PathBuf,
    /// Contestant fixture.
    pub users_path: PathBuf,
    /// Length of the main question countdown.
    pub question_seconds: u32,
    /// How long audience members may vote.
    pub poll_seconds: u32,
    /// Length of an FFF round.
    pub fff_seconds: u32,
    /// Base URL encoded in the poll QR link.
    pub public_base_url: String,
    /// Rows shown on the FFF leaderboard.
    pub leaderboard_size: usize,
    /// How far a channel observer may lag before messages are dropped.
    pub channel_capacity: usize,
    /// How far an SSE subscriber may lag before events are dropped.
    pub sse_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        questions = %app_config.questions_path.display(),
                        users = %app_config.users_path.display(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    questions_path: Option<PathBuf>,
    users_path: Option<PathBuf>,
    question_seconds: Option<u32>,
    poll_seconds: Option<u32>,
    fff_seconds: Option<u32>,
    public_base_url: Option<String>,
    leaderboard_size: Option<usize>,
    channel_capacity: Option<usize>,
    sse_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            questions_path: value
                .questions_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_QUESTIONS_PATH)),
            users_path: value
                .users_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_USERS_PATH)),
            question_seconds: positive(value.question_seconds, DEFAULT_QUESTION_SECONDS),
            poll_seconds: positive(value.poll_seconds, DEFAULT_POLL_SECONDS),
            fff_seconds: positive(value.fff_seconds, DEFAULT_FFF_SECONDS),
            public_base_url: value
                .public_base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.into()),
            leaderboard_size: value
                .leaderboard_size
                .unwrap_or(DEFAULT_LEADERBOARD_SIZE),
            channel_capacity: value
                .channel_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_CHANNEL_CAPACITY),
            sse_capacity: value
                .sse_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_SSE_CAPACITY),
        }
    }
}

fn positive(value: Option<u32>, default: u32) -> u32 {
    value.filter(|seconds| *seconds > 0).unwrap_or(default)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.question_seconds, 60);
        assert_eq!(config.public_base_url, "http://localhost:8080");
        assert_eq!(config.questions_path, PathBuf::from("data/questions.json"));
    }

    #[test]
    fn overrides_are_normalised() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "pollSeconds": 30,
                "fffSeconds": 0,
                "publicBaseUrl": "https://show.example/",
                "leaderboardSize": 5,
                "sseCapacity": 0
            }"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.poll_seconds, 30);
        assert_eq!(config.fff_seconds, 60);
        assert_eq!(config.public_base_url, "https://show.example");
        assert_eq!(config.leaderboard_size, 5);
        assert_eq!(config.sse_capacity, 256);
    }
}
