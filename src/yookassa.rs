use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::YooKassaConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("rejected with HTTP {status}: {description}")]
    Rejected { status: u16, description: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// True when the provider answered and refused the payment; the outcome of
    /// timeouts, transport failures and provider 5xx is unknown.
    pub fn is_definitive(&self) -> bool {
        matches!(self, ProviderError::Rejected { status, .. } if (400..500).contains(status))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(e)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub return_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentMetadata {
    pub payment_id: Uuid,
    pub user_id: Uuid,
}

/// Body of `POST /payments`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentRequest {
    pub amount: Amount,
    pub capture: bool,
    pub confirmation: ConfirmationRequest,
    pub description: String,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Pending,
    WaitingForCapture,
    Succeeded,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub confirmation_url: Option<String>,
}

/// Payment object as returned by the provider and embedded in notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    pub status: ProviderStatus,
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
}

impl ProviderPayment {
    pub fn confirmation_url(&self) -> Option<&str> {
        self.confirmation
            .as_ref()
            .and_then(|c| c.confirmation_url.as_deref())
    }
}

/// Incoming webhook body (`{"type": "notification", "event": "payment.succeeded", "object": {...}}`).
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub event: String,
    pub object: ProviderPayment,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
        idempotence_key: Uuid,
    ) -> Result<ProviderPayment, ProviderError>;

    async fn get_payment(&self, provider_id: &str) -> Result<ProviderPayment, ProviderError>;
}

#[derive(Clone)]
pub struct YooKassaClient {
    http: Client,
    api_url: String,
    shop_id: String,
    secret_key: String,
}

impl YooKassaClient {
    pub fn new(config: &YooKassaConfig) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            shop_id: config.shop_id.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let description = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(ErrorBody {
                    description: Some(d),
                    ..
                }) => d,
                Ok(ErrorBody { code: Some(c), .. }) => c,
                _ => body,
            };
            warn!(status = %status, %description, "yookassa rejected request");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                description,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for YooKassaClient {
    #[instrument(skip(self, request), fields(idempotence_key = %idempotence_key))]
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
        idempotence_key: Uuid,
    ) -> Result<ProviderPayment, ProviderError> {
        let response = self
            .http
            .post(format!("{}/payments", self.api_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", idempotence_key.to_string())
            .json(request)
            .send()
            .await?;
        let payment: ProviderPayment = Self::read(response).await?;
        debug!(provider_id = %payment.id, status = ?payment.status, "yookassa payment created");
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn get_payment(&self, provider_id: &str) -> Result<ProviderPayment, ProviderError> {
        let response = self
            .http
            .get(format!("{}/payments/{}", self.api_url, provider_id))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?;
        Self::read(response).await
    }
}
