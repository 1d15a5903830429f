use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    auth::jwt::AuthUser,
    error::{AppJson, Result},
    payments::{
        dto::{CreatePaymentRequest, CreatePaymentResponse, PaymentStatusResponse, PaymentsResponse},
        services,
    },
    state::AppState,
    yookassa::Notification,
};

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment", post(create_payment))
        .route("/payment-status/:id", get(payment_status))
        .route("/payments", get(list_payments))
}

pub fn notification_routes() -> Router<AppState> {
    Router::new().route("/yookassa/notifications", post(notification))
}

#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn create_payment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    AppJson(payload): AppJson<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>> {
    services::create_payment(&state, &claims, payload)
        .await
        .map(Json)
}

#[instrument(skip(state, claims), fields(user_id = %claims.sub))]
pub async fn payment_status(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PaymentStatusResponse>> {
    services::get_payment_status(&state.db, claims.sub, &id)
        .await
        .map(Json)
}

#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<PaymentsResponse>> {
    services::list_payments(&state.db, claims.sub).await.map(Json)
}

pub async fn notification(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Notification>,
) -> Result<Json<Value>> {
    services::handle_notification(&state, payload).await?;
    Ok(Json(json!({})))
}
