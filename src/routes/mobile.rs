use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::mobile::{PollBallotQuery, PollBallotResponse, PollVoteRequest, PollVoteResponse},
    error::AppError,
    services::mobile_service,
    state::SharedState,
};

/// Audience phone endpoints for the poll lifeline.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/mobile/poll", get(open_ballot))
        .route("/mobile/poll/vote", post(cast_vote))
}

/// Open a ballot for the question encoded in the QR link.
#[utoipa::path(
    get,
    path = "/mobile/poll",
    tag = "mobile",
    params(PollBallotQuery),
    responses(
        (status = 200, description = "Question to vote on", body = PollBallotResponse),
        (status = 400, description = "Missing question id or participant"),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn open_ballot(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<PollBallotQuery>>,
) -> Result<Json<PollBallotResponse>, AppError> {
    Ok(Json(mobile_service::open_ballot(&state, query)?))
}

/// Cast the single vote of a ballot.
#[utoipa::path(
    post,
    path = "/mobile/poll/vote",
    tag = "mobile",
    request_body = PollVoteRequest,
    responses(
        (status = 200, description = "Vote published", body = PollVoteResponse),
        (status = 400, description = "Ballot never opened"),
        (status = 409, description = "Already voted or time is up")
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PollVoteRequest>>,
) -> Result<Json<PollVoteResponse>, AppError> {
    Ok(Json(mobile_service::cast_vote(&state, payload)?))
}
