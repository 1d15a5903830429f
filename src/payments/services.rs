use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::claims::Claims,
    error::{AppError, Result},
    payments::{
        dto::{
            CreatePaymentRequest, CreatePaymentResponse, PaymentListItem, PaymentStatusResponse,
            PaymentsResponse,
        },
        repo_types::{Payment, PaymentStatus, ServiceRequest},
    },
    state::AppState,
    yookassa::{
        Amount, ConfirmationRequest, CreatePaymentRequest as ProviderRequest, Notification,
        PaymentMetadata, ProviderError, ProviderStatus,
    },
};

pub const CURRENCY: &str = "RUB";
const DEFAULT_DESCRIPTION: &str = "Service payment";
const PROVIDER_DESCRIPTION_LIMIT: usize = 128;

pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Returns the amount rounded to kopecks, the same value the provider is charged.
fn validate_amount(amount: Option<f64>) -> Result<f64> {
    let invalid = || AppError::Validation("Specify a valid amount".into());
    let amount = amount.filter(|a| a.is_finite() && *a > 0.0).ok_or_else(invalid)?;
    let rounded: f64 = format_amount(amount).parse().map_err(|_| invalid())?;
    if rounded > 0.0 {
        Ok(rounded)
    } else {
        Err(invalid())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checkout URL handed out when no provider credentials are configured.
pub fn test_payment_url(payment_id: Uuid) -> String {
    format!("/payment-success.html?payment_id={}&test=true", payment_id)
}

pub fn build_provider_request(
    public_base_url: &str,
    user_id: Uuid,
    payment_id: Uuid,
    amount: f64,
    description: Option<&str>,
    service_type: Option<&str>,
) -> ProviderRequest {
    let description = match description {
        Some(d) => d.to_string(),
        None => format!("Service payment: {}", service_type.unwrap_or("Service")),
    };
    ProviderRequest {
        amount: Amount {
            value: format_amount(amount),
            currency: CURRENCY.into(),
        },
        capture: true,
        confirmation: ConfirmationRequest {
            kind: "redirect",
            return_url: format!(
                "{}/payment-success.html?payment_id={}",
                public_base_url, payment_id
            ),
        },
        description: description.chars().take(PROVIDER_DESCRIPTION_LIMIT).collect(),
        metadata: PaymentMetadata {
            payment_id,
            user_id,
        },
    }
}

#[instrument(skip(state, user, req), fields(user_id = %user.sub))]
pub async fn create_payment(
    state: &AppState,
    user: &Claims,
    req: CreatePaymentRequest,
) -> Result<CreatePaymentResponse> {
    let amount = validate_amount(req.amount)?;
    let description = non_empty(req.description);
    let service_type = non_empty(req.service_type);
    let payment_id = Uuid::new_v4();

    let mut tx = state.db.begin().await?;
    let payment = match Payment::insert_pending(
        &mut *tx,
        user.sub,
        payment_id,
        amount,
        CURRENCY,
        description.as_deref().unwrap_or(DEFAULT_DESCRIPTION),
    )
    .await
    {
        Ok(payment) => payment,
        // Token outlived its account.
        Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
            warn!("payment requested for a deleted user");
            return Err(AppError::NotFound("User not found".into()));
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(kind) = service_type.as_deref() {
        let request =
            ServiceRequest::insert(&mut *tx, user.sub, kind, description.as_deref(), payment.id)
                .await?;
        debug!(service_request_id = request.id, service_type = %request.service_type, "service request recorded");
    }
    tx.commit().await?;
    info!(%payment_id, amount, "payment recorded");

    let Some(provider) = state.provider.as_ref() else {
        info!(%payment_id, "payment provider not configured, returning test url");
        return Ok(CreatePaymentResponse {
            payment_id,
            payment_url: test_payment_url(payment_id),
            amount,
            status: payment.status,
        });
    };

    let request = build_provider_request(
        &state.config.public_base_url,
        user.sub,
        payment_id,
        amount,
        description.as_deref(),
        service_type.as_deref(),
    );

    let created = match provider.create_payment(&request, payment_id).await {
        Ok(created) => created,
        Err(e) if e.is_definitive() => {
            warn!(%payment_id, error = %e, "provider rejected payment");
            if let Err(db_err) = Payment::transition(&state.db, payment.id, PaymentStatus::Failed).await {
                error!(%payment_id, error = %db_err, "failed to mark payment as failed");
            }
            return Err(e.into());
        }
        Err(e) => {
            warn!(%payment_id, error = %e, "provider outcome unknown, payment left pending");
            return Err(e.into());
        }
    };

    Payment::set_provider_reference(&state.db, payment.id, &created.id).await?;
    info!(%payment_id, provider_id = %created.id, "provider payment created");

    // The row keeps its provider reference so a later notification can still settle it.
    let payment_url = created
        .confirmation_url()
        .map(str::to_owned)
        .ok_or_else(|| ProviderError::Decode("response has no confirmation_url".into()))?;

    Ok(CreatePaymentResponse {
        payment_id,
        payment_url,
        amount,
        status: PaymentStatus::Pending,
    })
}

pub async fn get_payment_status(
    db: &SqlitePool,
    user_id: Uuid,
    raw_payment_id: &str,
) -> Result<PaymentStatusResponse> {
    let not_found = || AppError::NotFound("Payment not found".into());
    let payment_id = Uuid::parse_str(raw_payment_id).map_err(|_| not_found())?;
    let payment = Payment::find_for_user(db, user_id, payment_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(PaymentStatusResponse {
        payment_id: payment.payment_id,
        amount: payment.amount,
        currency: payment.currency,
        status: payment.status,
        created_at: payment.created_at,
    })
}

pub async fn list_payments(db: &SqlitePool, user_id: Uuid) -> Result<PaymentsResponse> {
    let payments = Payment::list_by_user(db, user_id)
        .await?
        .into_iter()
        .map(PaymentListItem::from)
        .collect();
    Ok(PaymentsResponse { payments })
}

fn local_status(remote: ProviderStatus) -> Option<PaymentStatus> {
    match remote {
        ProviderStatus::Succeeded => Some(PaymentStatus::Succeeded),
        ProviderStatus::Canceled => Some(PaymentStatus::Failed),
        ProviderStatus::Pending | ProviderStatus::WaitingForCapture | ProviderStatus::Unknown => None,
    }
}

/// Reconcile a provider notification into local state.
///
/// Notifications are unsigned, so with credentials configured the status is
/// re-read from the provider rather than taken from the body.
#[instrument(skip(state, notification), fields(event = %notification.event, provider_id = %notification.object.id))]
pub async fn handle_notification(state: &AppState, notification: Notification) -> Result<()> {
    if !notification.event.starts_with("payment.") {
        debug!("ignoring non-payment notification");
        return Ok(());
    }

    let provider_id = notification.object.id.as_str();
    let Some(payment) = Payment::find_by_provider_reference(&state.db, provider_id).await? else {
        warn!("notification for unknown payment");
        return Ok(());
    };

    let remote = match state.provider.as_ref() {
        Some(provider) => provider.get_payment(provider_id).await?.status,
        None => notification.object.status,
    };

    let Some(target) = local_status(remote) else {
        debug!(payment_id = %payment.payment_id, status = ?remote, "payment still in progress");
        return Ok(());
    };

    if Payment::transition(&state.db, payment.id, target).await? {
        info!(payment_id = %payment.payment_id, status = ?target, "payment status updated");
    } else {
        debug!(payment_id = %payment.payment_id, current = ?payment.status, "payment already settled");
    }
    Ok(())
}
