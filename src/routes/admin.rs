use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        admin::{
            AdminQuestionView, CommandAccepted, MarkAnswerRequest, PollTallyResponse,
            UserSummary, UsersResponse,
        },
        display::MoneyLevelView,
        fff::{LeaderboardResponse, RoundStatusResponse},
        protocol::AdminCommand,
    },
    error::{AppError, ServiceError},
    state::{SharedState, game::Lifeline},
};

/// Admin screen endpoints: contestant selection, game commands, poll and FFF controls.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", get(get_user))
        .route("/admin/users/{id}/select", post(select_user))
        .route("/admin/game/next", post(next_question))
        .route("/admin/game/timer/start", post(start_timer))
        .route("/admin/game/timer/stop", post(stop_timer))
        .route("/admin/game/quit", post(quit_game))
        .route("/admin/game/mark", post(mark_answer))
        .route("/admin/lifelines/{lifeline}", post(activate_lifeline))
        .route("/admin/poll", get(poll_tally))
        .route("/admin/poll/results", post(show_poll_results))
        .route("/admin/questions/{id}", get(view_question))
        .route("/admin/money-tree", get(money_tree))
        .route("/admin/fff", get(fff_status))
        .route("/admin/fff/start", post(start_fff_round))
        .route("/admin/fff/end", post(end_fff_round))
        .route("/admin/fff/reset", post(reset_fff_round))
        .route("/admin/fff/leaderboard", get(fff_leaderboard))
}

/// List registered contestants as mirrored by the admin.
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    responses((status = 200, description = "Contestants and the selected one", body = UsersResponse))
)]
pub async fn list_users(State(state): State<SharedState>) -> Result<Json<UsersResponse>, AppError> {
    let session = state.require_session()?;
    Ok(Json(session.admin.users().await))
}

/// Mirror of a single contestant.
#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    tag = "admin",
    params(("id" = u32, Path, description = "Contestant id")),
    responses(
        (status = 200, description = "Contestant", body = UserSummary),
        (status = 404, description = "Unknown contestant")
    )
)]
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<u32>,
) -> Result<Json<UserSummary>, AppError> {
    let session = state.require_session()?;
    let user = session.admin.user(id).await.map_err(ServiceError::from)?;
    Ok(Json(user))
}

/// Put a contestant on the hot seat (`switchUser`).
#[utoipa::path(
    post,
    path = "/admin/users/{id}/select",
    tag = "admin",
    params(("id" = u32, Path, description = "Contestant id")),
    responses((status = 200, description = "Command published", body = CommandAccepted))
)]
pub async fn select_user(
    State(state): State<SharedState>,
    Path(id): Path<u32>,
) -> Result<Json<CommandAccepted>, AppError> {
    let session = state.require_session()?;
    let accepted = session
        .admin
        .select_user(id)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(accepted))
}

async fn send(state: &SharedState, command: AdminCommand) -> Result<Json<CommandAccepted>, AppError> {
    let session = state.require_session()?;
    let accepted = session
        .admin
        .send(command)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(accepted))
}

/// Issue the next unasked question to the selected contestant.
#[utoipa::path(
    post,
    path = "/admin/game/next",
    tag = "admin",
    responses((status = 200, description = "Command published", body = CommandAccepted))
)]
pub async fn next_question(
    State(state): State<SharedState>,
) -> Result<Json<CommandAccepted>, AppError> {
    send(&state, AdminCommand::LoadNextQuestion).await
}

/// Start or resume the question countdown.
#[utoipa::path(
    post,
    path = "/admin/game/timer/start",
    tag = "admin",
    responses((status = 200, description = "Command published", body = CommandAccepted))
)]
pub async fn start_timer(
    State(state): State<SharedState>,
) -> Result<Json<CommandAccepted>, AppError> {
    send(&state, AdminCommand::StartTimer).await
}

/// Pause the question countdown.
#[utoipa::path(
    post,
    path = "/admin/game/timer/stop",
    tag = "admin",
    responses((status = 200, description = "Command published", body = CommandAccepted))
)]
pub async fn stop_timer(
    State(state): State<SharedState>,
) -> Result<Json<CommandAccepted>, AppError> {
    send(&state, AdminCommand::StopTimer).await
}

/// Let the contestant walk away with the last secured amount.
#[utoipa::path(
    post,
    path = "/admin/game/quit",
    tag = "admin",
    responses((status = 200, description = "Command published", body = CommandAccepted))
)]
pub async fn quit_game(State(state): State<SharedState>) -> Result<Json<CommandAccepted>, AppError> {
    send(&state, AdminCommand::QuitGame).await
}

/// Resolve the contestant's locked answer.
#[utoipa::path(
    post,
    path = "/admin/game/mark",
    tag = "admin",
    request_body = MarkAnswerRequest,
    responses((status = 200, description = "Command published", body = CommandAccepted))
)]
pub async fn mark_answer(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<MarkAnswerRequest>>,
) -> Result<Json<CommandAccepted>, AppError> {
    send(
        &state,
        AdminCommand::MarkAnswer {
            result: payload.result,
        },
    )
    .await
}

/// Activate one of the four lifelines.
#[utoipa::path(
    post,
    path = "/admin/lifelines/{lifeline}",
    tag = "admin",
    params(("lifeline" = Lifeline, Path, description = "fiftyFifty, swapQuestion, audiencePoll or doubleDip")),
    responses((status = 200, description = "Command published", body = CommandAccepted))
)]
pub async fn activate_lifeline(
    State(state): State<SharedState>,
    Path(lifeline): Path<Lifeline>,
) -> Result<Json<CommandAccepted>, AppError> {
    send(&state, lifeline.into()).await
}

/// Current audience poll tally.
#[utoipa::path(
    get,
    path = "/admin/poll",
    tag = "admin",
    responses((status = 200, description = "Votes per option", body = PollTallyResponse))
)]
pub async fn poll_tally(
    State(state): State<SharedState>,
) -> Result<Json<PollTallyResponse>, AppError> {
    let session = state.require_session()?;
    Ok(Json(session.admin.poll_tally().await))
}

/// Send the tally to the display, provided it still matches the live question.
#[utoipa::path(
    post,
    path = "/admin/poll/results",
    tag = "admin",
    responses(
        (status = 200, description = "Command published", body = CommandAccepted),
        (status = 409, description = "The tally belongs to another question")
    )
)]
pub async fn show_poll_results(
    State(state): State<SharedState>,
) -> Result<Json<CommandAccepted>, AppError> {
    let session = state.require_session()?;
    let accepted = session
        .admin
        .show_poll_results()
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(accepted))
}

/// Look at any level of the bank, retargeting the poll tally.
#[utoipa::path(
    get,
    path = "/admin/questions/{id}",
    tag = "admin",
    params(("id" = u32, Path, description = "Question level id")),
    responses(
        (status = 200, description = "Question with its answer", body = AdminQuestionView),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn view_question(
    State(state): State<SharedState>,
    Path(id): Path<u32>,
) -> Result<Json<AdminQuestionView>, AppError> {
    let session = state.require_session()?;
    let view = session
        .admin
        .view_question(id)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(view))
}

/// Prize ladder with the selected contestant's position.
#[utoipa::path(
    get,
    path = "/admin/money-tree",
    tag = "admin",
    responses((status = 200, description = "Levels from the bottom up", body = [MoneyLevelView]))
)]
pub async fn money_tree(
    State(state): State<SharedState>,
) -> Result<Json<Vec<MoneyLevelView>>, AppError> {
    let session = state.require_session()?;
    Ok(Json(session.admin.money_tree().await))
}

/// Fastest-finger-first round status.
#[utoipa::path(
    get,
    path = "/admin/fff",
    tag = "fff",
    responses((status = 200, description = "Round status", body = RoundStatusResponse))
)]
pub async fn fff_status(
    State(state): State<SharedState>,
) -> Result<Json<RoundStatusResponse>, AppError> {
    let session = state.require_session()?;
    let status = session.fff.status().await.map_err(ServiceError::from)?;
    Ok(Json(status))
}

/// Open an FFF round and push the question to participants.
#[utoipa::path(
    post,
    path = "/admin/fff/start",
    tag = "fff",
    responses(
        (status = 200, description = "Round started", body = RoundStatusResponse),
        (status = 409, description = "A round is already active")
    )
)]
pub async fn start_fff_round(
    State(state): State<SharedState>,
) -> Result<Json<RoundStatusResponse>, AppError> {
    let session = state.require_session()?;
    let status = session.fff.start_round().await.map_err(ServiceError::from)?;
    Ok(Json(status))
}

/// Close the running FFF round and rank submissions.
#[utoipa::path(
    post,
    path = "/admin/fff/end",
    tag = "fff",
    responses(
        (status = 200, description = "Round closed", body = LeaderboardResponse),
        (status = 409, description = "No round is active")
    )
)]
pub async fn end_fff_round(
    State(state): State<SharedState>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let session = state.require_session()?;
    let leaderboard = session.fff.end_round().await.map_err(ServiceError::from)?;
    Ok(Json(leaderboard))
}

/// Clear the FFF round and send participants back to waiting.
#[utoipa::path(
    post,
    path = "/admin/fff/reset",
    tag = "fff",
    responses((status = 200, description = "Round cleared", body = RoundStatusResponse))
)]
pub async fn reset_fff_round(
    State(state): State<SharedState>,
) -> Result<Json<RoundStatusResponse>, AppError> {
    let session = state.require_session()?;
    let status = session.fff.reset_round().await.map_err(ServiceError::from)?;
    Ok(Json(status))
}

/// Leaderboard of the last closed FFF round.
#[utoipa::path(
    get,
    path = "/admin/fff/leaderboard",
    tag = "fff",
    responses(
        (status = 200, description = "Ranked submissions", body = LeaderboardResponse),
        (status = 409, description = "A round is still running")
    )
)]
pub async fn fff_leaderboard(
    State(state): State<SharedState>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let session = state.require_session()?;
    let leaderboard = session.fff.leaderboard().await.map_err(ServiceError::from)?;
    Ok(Json(leaderboard))
}
