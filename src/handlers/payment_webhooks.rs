//! Inbound payment confirmations.
//!
//! The payment service posts `{orderId, stripePaymentId, receiptUrl}` once a
//! checkout session is paid. When a webhook secret is configured the body
//! must be signed; signatures prove origin only and do not deduplicate.

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use super::common::validate_input;
use crate::{
    errors::ServiceError,
    services::orders::{OrderResponse, PaidOrderRequest},
    AppState,
};

type HmacSha256 = Hmac<Sha256>;

pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

/// `order_paid` event
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OrderResponse>, ServiceError> {
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let now = chrono::Utc::now().timestamp();
        if !verify_signature(&headers, &body, secret, state.config.webhook_tolerance_secs(), now) {
            warn!("Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let request: PaidOrderRequest = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid payment event: {}", e)))?;
    validate_input(&request)?;

    info!(order_id = %request.order_id, "Payment confirmation received");
    let order = state.order_service.paid_order(request).await?;
    Ok(Json(order))
}

/// Accepts either `x-timestamp` + `x-signature` headers or a
/// `Stripe-Signature: t=...,v1=...` header. Both sign `"{timestamp}.{body}"`.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let (timestamp, signature) = match (header("x-timestamp"), header("x-signature")) {
        (Some(ts), Some(sig)) => (ts, sig),
        _ => match header("stripe-signature").and_then(parse_stripe_header) {
            Some(pair) => pair,
            None => return false,
        },
    };

    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    match now.checked_sub(ts).map(i64::unsigned_abs) {
        Some(age) if age <= tolerance_secs => {}
        _ => return false,
    }

    match sign(secret, timestamp, payload) {
        Some(expected) => constant_time_eq(&expected, signature),
        None => false,
    }
}

fn parse_stripe_header(value: &str) -> Option<(&str, &str)> {
    let mut ts = None;
    let mut v1 = None;
    for part in value.split(',') {
        match part.trim().split_once('=') {
            Some(("t", val)) => ts = Some(val),
            Some(("v1", val)) => v1 = Some(val),
            _ => {}
        }
    }
    ts.zip(v1)
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
