pub mod dto;
pub mod handlers;
pub mod query;
pub mod repo;
pub mod repo_types;
mod services;
mod stats;

#[cfg(test)]
pub(crate) mod memory;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::transaction_routes()
}
