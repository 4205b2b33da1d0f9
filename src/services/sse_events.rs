
use crate::{
    dto::{
        admin::{
            AdminNoticeEvent, PollTallyResponse, QuestionViewedEvent, SelectionUpdatedEvent,
            UserUpdatedEvent,
        },
        display::{
            AnswerRevealEvent, GameOverEvent, LifelinesEvent, NoticeEvent, NoticeLevel,
            OptionsEliminatedEvent, PollClosedEvent, PollCloseReason, PollInviteEvent,
            PollResultsEvent, QuestionShownEvent, SelectionEvent, TimerEvent, TimerKind,
        },
        fff::{LeaderboardResponse, RoundStartedEvent, SubmissionReceivedEvent},
        sse::ServerEvent,
    },
    state::SseHub,
};

const EVENT_QUESTION: &str = "display.question";
const EVENT_TIMER: &str = "display.timer";
const EVENT_SELECTION: &str = "display.selection";
const EVENT_ELIMINATED: &str = "display.eliminated";
const EVENT_ANSWER: &str = "display.answer";
const EVENT_GAME_OVER: &str = "display.game_over";
const EVENT_LIFELINES: &str = "display.lifelines";
const EVENT_POLL_INVITE: &str = "display.poll_invite";
const EVENT_POLL_EXPIRED: &str = "display.poll_expired";
const EVENT_POLL_CLOSED: &str = "display.poll_closed";
const EVENT_POLL_RESULTS: &str = "display.poll_results";
const EVENT_NOTICE: &str = "display.notice";
const EVENT_FFF_STARTED: &str = "fff.round_started";
const EVENT_FFF_TIMER: &str = "fff.timer";
const EVENT_FFF_SUBMISSION: &str = "fff.submission";
const EVENT_FFF_LEADERBOARD: &str = "fff.leaderboard";
const EVENT_FFF_RESET: &str = "fff.reset";
const EVENT_ADMIN_USER: &str = "admin.user_updated";
const EVENT_ADMIN_SELECTION: &str = "admin.selection";
const EVENT_ADMIN_TALLY: &str = "admin.poll_tally";
const EVENT_ADMIN_QUESTION: &str = "admin.question_viewed";
const EVENT_ADMIN_NOTICE: &str = "admin.notice";

/// Delay renderers wait before hiding the poll QR modal.
const POLL_HIDE_DELAY_MS: u64 = 3000;

/// Broadcast that a question is on screen.
pub fn broadcast_question_shown(hub: &SseHub, payload: &QuestionShownEvent) {
    hub.emit(EVENT_QUESTION, payload);
}

/// Broadcast a countdown tick; FFF ticks use their own event name.
pub fn broadcast_timer(hub: &SseHub, payload: &TimerEvent) {
    let event = match payload.timer {
        TimerKind::Fff => EVENT_FFF_TIMER,
        TimerKind::Question | TimerKind::Poll => EVENT_TIMER,
    };
    hub.emit(event, payload);
}

/// Broadcast the player's option click.
pub fn broadcast_selection(hub: &SseHub, payload: &SelectionEvent) {
    hub.emit(EVENT_SELECTION, payload);
}

/// Broadcast the options removed by fifty-fifty.
pub fn broadcast_eliminated(hub: &SseHub, payload: &OptionsEliminatedEvent) {
    hub.emit(EVENT_ELIMINATED, payload);
}

/// Broadcast the reveal of a marked answer.
pub fn broadcast_answer(hub: &SseHub, payload: &AnswerRevealEvent) {
    hub.emit(EVENT_ANSWER, payload);
}

/// Broadcast the end of a contestant's game.
pub fn broadcast_game_over(hub: &SseHub, payload: &GameOverEvent) {
    hub.emit(EVENT_GAME_OVER, payload);
}

/// Broadcast the lifeline board.
pub fn broadcast_lifelines(hub: &SseHub, payload: &LifelinesEvent) {
    hub.emit(EVENT_LIFELINES, payload);
}

/// Broadcast the audience poll invite.
pub fn broadcast_poll_invite(hub: &SseHub, payload: &PollInviteEvent) {
    hub.emit(EVENT_POLL_INVITE, payload);
}

/// Broadcast that the poll invite went away.
pub fn broadcast_poll_closed(hub: &SseHub, reason: PollCloseReason) {
    let event = match reason {
        PollCloseReason::Expired => EVENT_POLL_EXPIRED,
        PollCloseReason::Closed | PollCloseReason::Results => EVENT_POLL_CLOSED,
    };
    let hide_after_ms = match reason {
        PollCloseReason::Expired => POLL_HIDE_DELAY_MS,
        PollCloseReason::Closed | PollCloseReason::Results => 0,
    };
    hub.emit(
        event,
        &PollClosedEvent {
            reason,
            hide_after_ms,
        },
    );
}

/// Broadcast the audience poll results.
pub fn broadcast_poll_results(hub: &SseHub, payload: &PollResultsEvent) {
    hub.emit(EVENT_POLL_RESULTS, payload);
}

/// Broadcast a status line on the display.
pub fn broadcast_notice(hub: &SseHub, level: NoticeLevel, message: impl Into<String>) {
    hub.emit(
        EVENT_NOTICE,
        &NoticeEvent {
            level,
            message: message.into(),
        },
    );
}

/// Broadcast that an FFF round opened.
pub fn broadcast_round_started(hub: &SseHub, payload: &RoundStartedEvent) {
    hub.emit(EVENT_FFF_STARTED, payload);
}

/// Broadcast that a participant's ordering was collected.
pub fn broadcast_submission_received(hub: &SseHub, payload: &SubmissionReceivedEvent) {
    hub.emit(EVENT_FFF_SUBMISSION, payload);
}

/// Broadcast the FFF leaderboard.
pub fn broadcast_leaderboard(hub: &SseHub, payload: &LeaderboardResponse) {
    hub.emit(EVENT_FFF_LEADERBOARD, payload);
}

/// Broadcast that the FFF round was reset.
pub fn broadcast_round_reset(hub: &SseHub) {
    hub.broadcast(ServerEvent::new(Some(EVENT_FFF_RESET.to_string()), "{}".into()));
}

/// Push a mirrored contestant change to the admin stream.
pub fn broadcast_user_updated(hub: &SseHub, payload: &UserUpdatedEvent) {
    hub.emit(EVENT_ADMIN_USER, payload);
}

/// Push the player's selection to the admin stream.
pub fn broadcast_selection_updated(hub: &SseHub, payload: &SelectionUpdatedEvent) {
    hub.emit(EVENT_ADMIN_SELECTION, payload);
}

/// Push the live poll tally to the admin stream.
pub fn broadcast_poll_tally(hub: &SseHub, payload: &PollTallyResponse) {
    hub.emit(EVENT_ADMIN_TALLY, payload);
}

/// Push the question under review to the admin stream.
pub fn broadcast_question_viewed(hub: &SseHub, payload: &QuestionViewedEvent) {
    hub.emit(EVENT_ADMIN_QUESTION, payload);
}

/// Push a status line to the admin stream.
pub fn broadcast_admin_notice(hub: &SseHub, message: impl Into<String>) {
    hub.emit(
        EVENT_ADMIN_NOTICE,
        &AdminNoticeEvent {
            message: message.into(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fff_ticks_use_their_own_event_name() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        broadcast_timer(
            &hub,
            &TimerEvent {
                timer: TimerKind::Fff,
                remaining: 9,
                running: true,
                pulse: true,
            },
        );

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("fff.timer"));
        assert!(event.data.contains("\"remaining\":9"));
    }

    #[test]
    fn expired_poll_asks_renderers_to_wait() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        broadcast_poll_closed(&hub, PollCloseReason::Expired);

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("display.poll_expired"));
        assert!(event.data.contains("\"hide_after_ms\":3000"));
    }
}
