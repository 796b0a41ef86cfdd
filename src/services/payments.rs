use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{ServiceError, Upstream};

/// Currency every payment session is opened in.
pub const PAYMENT_CURRENCY: &str = "usd";

/// Line item as the payment service displays it at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLineItem {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: i32,
}

/// Body of `create_payment_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionRequest {
    pub order_id: Uuid,
    pub currency: String,
    pub items: Vec<PaymentLineItem>,
}

/// Checkout handle the client is redirected to. Confirmation arrives later
/// as an asynchronous payment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    #[serde(default, alias = "sessionId", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentSessionRequester: Send + Sync {
    /// Pure request/response call; failures are not retried.
    async fn request_session(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<PaymentSession, ServiceError>;
}

/// HTTP binding: `POST {base_url}/payments/create-payment-session`.
#[derive(Clone)]
pub struct HttpPaymentSessionRequester {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentSessionRequester {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("payment client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentSessionRequester for HttpPaymentSessionRequester {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, items = request.items.len()))]
    async fn request_session(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let response = self
            .client
            .post(format!("{}/payments/create-payment-session", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::upstream(Upstream::Payments, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "payment service rejected session request");
            return Err(ServiceError::upstream(
                Upstream::Payments,
                format!("create_payment_session returned {}", status),
            ));
        }

        let session: PaymentSession = response.json().await.map_err(|e| {
            ServiceError::upstream(Upstream::Payments, format!("invalid reply: {}", e))
        })?;

        info!(url = %session.url, "payment session created");
        Ok(session)
    }
}
