/// Admin mirror and command dispatcher.
pub mod admin_service;
/// Raw broadcast channel reads and writes.
pub mod channel_service;
/// Resumable one-second countdown.
pub mod countdown;
/// Display screen task owning the game progress.
pub mod display_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Fastest-finger-first round coordinator.
pub mod fff_service;
/// Game rules over the question bank and contestants.
pub mod game_engine;
/// Health check service.
pub mod health_service;
/// Audience poll ballots and FFF answer sheets.
pub mod mobile_service;
/// FFF leaderboard ranking.
pub mod ranking;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
