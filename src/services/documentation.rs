use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the KBC show backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::admin_stream,
        crate::routes::sse::channel_stream,
        crate::routes::channel::read_topic,
        crate::routes::channel::write_topic,
        crate::routes::websocket::ws_handler,
        crate::routes::admin::list_users,
        crate::routes::admin::get_user,
        crate::routes::admin::select_user,
        crate::routes::admin::next_question,
        crate::routes::admin::start_timer,
        crate::routes::admin::stop_timer,
        crate::routes::admin::quit_game,
        crate::routes::admin::mark_answer,
        crate::routes::admin::activate_lifeline,
        crate::routes::admin::poll_tally,
        crate::routes::admin::show_poll_results,
        crate::routes::admin::view_question,
        crate::routes::admin::money_tree,
        crate::routes::admin::fff_status,
        crate::routes::admin::start_fff_round,
        crate::routes::admin::end_fff_round,
        crate::routes::admin::reset_fff_round,
        crate::routes::admin::fff_leaderboard,
        crate::routes::display::select_option,
        crate::routes::display::close_poll,
        crate::routes::display::display_state,
        crate::routes::mobile::open_ballot,
        crate::routes::mobile::cast_vote,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::AdminHandshake,
            crate::dto::sse::ChannelEvent,
            crate::dto::ws::FffInboundMessage,
            crate::dto::ws::FffOutboundMessage,
            crate::dto::protocol::AdminMessage,
            crate::dto::protocol::AdminCommand,
            crate::dto::protocol::MarkResult,
            crate::dto::protocol::ProgressEcho,
            crate::dto::protocol::SelectionEcho,
            crate::dto::protocol::PollVote,
            crate::dto::protocol::PollTally,
            crate::dto::protocol::PollPercentages,
            crate::dto::protocol::FffMessage,
            crate::dto::protocol::FffCommand,
            crate::dto::protocol::FffSubmission,
            crate::dto::admin::UserSummary,
            crate::dto::admin::UsersResponse,
            crate::dto::admin::AdminQuestionView,
            crate::dto::admin::MarkAnswerRequest,
            crate::dto::admin::CommandAccepted,
            crate::dto::admin::PollTallyResponse,
            crate::dto::admin::UserUpdatedEvent,
            crate::dto::admin::SelectionUpdatedEvent,
            crate::dto::admin::QuestionViewedEvent,
            crate::dto::admin::AdminNoticeEvent,
            crate::dto::display::QuestionView,
            crate::dto::display::MoneyLevelView,
            crate::dto::display::TimerKind,
            crate::dto::display::QuestionShownEvent,
            crate::dto::display::TimerEvent,
            crate::dto::display::SelectionEvent,
            crate::dto::display::OptionsEliminatedEvent,
            crate::dto::display::AnswerRevealEvent,
            crate::dto::display::GameOverEvent,
            crate::dto::display::PollInviteEvent,
            crate::dto::display::PollCloseReason,
            crate::dto::display::PollClosedEvent,
            crate::dto::display::PollResultsEvent,
            crate::dto::display::LifelinesEvent,
            crate::dto::display::NoticeLevel,
            crate::dto::display::NoticeEvent,
            crate::dto::display::SelectOptionRequest,
            crate::dto::display::DisplaySnapshot,
            crate::dto::fff::LeaderboardEntry,
            crate::dto::fff::LeaderboardResponse,
            crate::dto::fff::RoundStartedEvent,
            crate::dto::fff::SubmissionReceivedEvent,
            crate::dto::fff::RoundStatusResponse,
            crate::dto::mobile::PollBallotResponse,
            crate::dto::mobile::PollVoteRequest,
            crate::dto::mobile::PollVoteResponse,
            crate::state::channel::Topic,
            crate::state::game::OptionKey,
            crate::state::game::QuestionOptions,
            crate::state::game::Lifeline,
            crate::state::game::LifelinesUsed,
            crate::state::game::UserProgress,
            crate::state::game::FffQuestion,
            crate::state::state_machine::GameStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "channel", description = "Raw broadcast channel access"),
        (name = "admin", description = "Admin screen: contestants, game commands and lifelines"),
        (name = "display", description = "Inputs from the display screen"),
        (name = "mobile", description = "Audience poll ballots"),
        (name = "fff", description = "Fastest-finger-first rounds"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/channel",
            "/channel/{topic}",
            "/ws/fff",
            "/admin/lifelines/{lifeline}",
            "/admin/fff/leaderboard",
            "/display/select",
            "/mobile/poll/vote",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
