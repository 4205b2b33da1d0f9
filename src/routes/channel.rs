use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde_json::Value;

use crate::{
    error::AppError,
    services::channel_service,
    state::{SharedState, channel::Topic},
};

/// Read and write the broadcast channel by key.
pub fn router() -> Router<SharedState> {
    Router::new().route("/channel/{topic}", get(read_topic).put(write_topic))
}

/// Latest value written under a channel key.
#[utoipa::path(
    get,
    path = "/channel/{topic}",
    tag = "channel",
    params(("topic" = Topic, Path, description = "Channel key, e.g. kbcAdminCommand")),
    responses(
        (status = 200, description = "Stored JSON value", body = Object),
        (status = 404, description = "Nothing written under this key yet")
    )
)]
pub async fn read_topic(
    State(state): State<SharedState>,
    Path(topic): Path<Topic>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(channel_service::read(&state, topic)?))
}

/// Publish a value under a channel key on behalf of an external participant.
#[utoipa::path(
    put,
    path = "/channel/{topic}",
    tag = "channel",
    params(("topic" = Topic, Path, description = "Channel key, e.g. kbcPollVote")),
    request_body = Object,
    responses(
        (status = 204, description = "Value stored and fanned out"),
        (status = 400, description = "Value does not match the key's payload")
    )
)]
pub async fn write_topic(
    State(state): State<SharedState>,
    Path(topic): Path<Topic>,
    Json(value): Json<Value>,
) -> Result<StatusCode, AppError> {
    channel_service::write(&state, topic, value)?;
    Ok(StatusCode::NO_CONTENT)
}
