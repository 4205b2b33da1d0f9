use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{
    dto::sse::ChannelEvent,
    error::AppError,
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Display events stream", content_type = "text/event-stream", body = String))
)]
/// Stream display events (questions, timer ticks, reveals, polls, FFF) to renderers.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_public(&state);
    info!("New public SSE connection");
    sse_service::broadcast_handshake(state.public_sse(), "public", state.is_degraded());
    sse_service::to_sse_stream(receiver, StreamKind::Public)
}

#[utoipa::path(
    get,
    path = "/sse/admin",
    tag = "sse",
    responses(
        (status = 200, description = "Admin mirror stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "Another admin stream is active", body = String)
    )
)]
/// Stream admin mirror updates, establishing the admin token.
pub async fn admin_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let (receiver, token) = sse_service::subscribe_admin(&state).await?;
    info!("New admin SSE connection");
    sse_service::broadcast_admin_handshake(state.admin_sse(), &token);
    sse_service::broadcast_handshake(state.admin_sse(), "admin", state.is_degraded());
    Ok(sse_service::to_sse_stream(
        receiver,
        StreamKind::Admin(state, token),
    ))
}

#[utoipa::path(
    get,
    path = "/sse/channel",
    tag = "sse",
    responses((status = 200, description = "Every broadcast channel write", content_type = "text/event-stream", body = ChannelEvent))
)]
/// Stream raw broadcast channel writes.
pub async fn channel_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_channel(&state);
    info!("New channel SSE connection");
    sse_service::to_channel_stream(receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .route("/sse/admin", get(admin_stream))
        .route("/sse/channel", get(channel_stream))
}
