use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

pub mod dto;
pub mod encoder;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod lock;
pub mod model;
pub mod orchestrator;
pub mod recorder;
pub mod repository;
pub mod service;
pub mod transfer;
pub mod workspace;

#[cfg(test)]
pub mod testing;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/transcode", post(handler::submit_transcode))
        .route("/{video_id}", get(handler::get_job))
}
