use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::payment_routes())
        .merge(handlers::notification_routes())
}
