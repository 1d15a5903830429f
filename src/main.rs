mod app;
mod auth;
mod config;
mod db;
mod error;
mod payments;
mod state;
mod yookassa;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "consult_backend=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;
    let db = state.db.clone();
    let config = state.config.clone();

    app::serve(app::build_app(state), &config).await?;

    db.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
