use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{PaymentListRow, PaymentStatus};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "serviceType")]
    pub service_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_id: Uuid,
    pub payment_url: String,
    pub amount: f64,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct PaymentListItem {
    pub payment_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub status: PaymentStatus,
    pub service_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<PaymentListRow> for PaymentListItem {
    fn from(row: PaymentListRow) -> Self {
        Self {
            payment_id: row.payment_id,
            amount: row.amount,
            description: row.description,
            status: row.status,
            service_type: row.service_type,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentsResponse {
    pub payments: Vec<PaymentListItem>,
}
