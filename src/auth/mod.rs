use crate::state::AppState;
use axum::Router;

pub mod claims;
mod dto;
pub mod handlers;
pub mod jwt;
mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
