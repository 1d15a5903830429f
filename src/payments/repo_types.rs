use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Payment record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: i64,
    pub user_id: Uuid,
    pub payment_id: Uuid, // client-visible id, also the provider idempotence key
    pub amount: f64,
    pub currency: String,
    pub description: Option<String>,
    pub status: PaymentStatus,
    pub yookassa_payment_id: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Payment history row joined with the service it paid for.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentListRow {
    pub payment_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub status: PaymentStatus,
    pub service_type: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRequest {
    pub id: i64,
    pub user_id: Uuid,
    pub service_type: String,
    pub description: Option<String>,
    pub status: String,
    pub payment_id: Option<i64>,
    pub created_at: OffsetDateTime,
}
