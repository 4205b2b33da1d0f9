use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        display::{DisplaySnapshot, SelectOptionRequest},
        protocol::SelectionEcho,
    },
    error::{AppError, ServiceError},
    state::SharedState,
};

/// Inputs originating on the display screen itself.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/display/select", post(select_option))
        .route("/display/poll/close", post(close_poll))
        .route("/display/state", get(display_state))
}

/// The contestant clicks an option on the display.
#[utoipa::path(
    post,
    path = "/display/select",
    tag = "display",
    request_body = SelectOptionRequest,
    responses(
        (status = 200, description = "Selection locked and echoed to the admin", body = SelectionEcho),
        (status = 400, description = "Option eliminated by fifty-fifty"),
        (status = 409, description = "No open question or a selection is already pending")
    )
)]
pub async fn select_option(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SelectOptionRequest>>,
) -> Result<Json<SelectionEcho>, AppError> {
    let session = state.require_session()?;
    let echo = session
        .display
        .select_option(payload.option)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(echo))
}

/// Dismiss the audience poll QR invite.
#[utoipa::path(
    post,
    path = "/display/poll/close",
    tag = "display",
    responses(
        (status = 204, description = "Invite closed"),
        (status = 409, description = "No poll invite is open")
    )
)]
pub async fn close_poll(State(state): State<SharedState>) -> Result<StatusCode, AppError> {
    let session = state.require_session()?;
    let closed = session
        .display
        .close_poll()
        .await
        .map_err(ServiceError::from)?;
    if closed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::InvalidState("no poll invite is open".into()).into())
    }
}

/// What the display currently shows.
#[utoipa::path(
    get,
    path = "/display/state",
    tag = "display",
    responses(
        (status = 200, description = "Display snapshot", body = DisplaySnapshot),
        (status = 503, description = "Fixtures failed to load")
    )
)]
pub async fn display_state(
    State(state): State<SharedState>,
) -> Result<Json<DisplaySnapshot>, AppError> {
    let session = state.require_session()?;
    let snapshot = session
        .display
        .snapshot()
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(snapshot))
}
