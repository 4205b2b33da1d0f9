use axum::Router;

use crate::state::SharedState;

pub mod admin;
pub mod channel;
pub mod display;
pub mod docs;
pub mod health;
pub mod mobile;
pub mod sse;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(websocket::router())
        .merge(channel::router())
        .merge(admin::router())
        .merge(display::router())
        .merge(mobile::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
