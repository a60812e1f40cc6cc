pub mod dto;
pub mod handlers;
pub mod memory;
pub mod model;
pub mod policy;
pub mod repo;
pub mod validation;

use axum::{middleware, Router};

use crate::{auth::require_api_key, state::AppState};

/// User routes, all behind api key authentication.
pub fn router(state: AppState) -> Router<AppState> {
    handlers::user_routes().route_layer(middleware::from_fn_with_state(state, require_api_key))
}
