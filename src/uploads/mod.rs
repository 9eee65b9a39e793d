use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/predict", post(handlers::predict))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
        .route("/history", get(handlers::history))
        .route("/uploads/:filename", get(handlers::serve_original))
        .route("/annotated/:filename", get(handlers::serve_annotated))
}
