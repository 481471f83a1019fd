mod dto;
pub mod engine;
pub mod handlers;
pub mod parser;

use crate::state::AppState;
use axum::Router;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    handlers::ocr_routes(max_upload_bytes)
}
