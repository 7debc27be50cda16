#![allow(dead_code)]

use axum::Router;

use room_api::config::Config;
use room_api::AppState;

/// Application state with default configuration and empty registries.
pub fn test_state() -> AppState {
    AppState::new(Config::default())
}

/// Application state whose empty rooms are reaped after `idle_timeout_secs`.
pub fn test_state_with_idle_timeout(idle_timeout_secs: u64) -> AppState {
    AppState::new(Config {
        room_idle_timeout_secs: idle_timeout_secs,
        ..Config::default()
    })
}

/// Build the full router wired to a fresh state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = room_api::routes::router().with_state(state.clone());
    (app, state)
}
