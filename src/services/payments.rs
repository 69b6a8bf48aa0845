use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::entities::order::Model as OrderModel;
use crate::entities::order_item::Model as OrderItemModel;
use crate::errors::ServiceError;
use crate::services::identity::Session;
use crate::services::orders::OrderService;

type HmacSha256 = Hmac<Sha256>;

/// Payment boundary consumed by the checkout orchestrator. Returns the
/// redirect URL the browser is sent to.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        order_id: Uuid,
        session: &Session,
    ) -> Result<String, ServiceError>;
}

/// Stripe-style gateway: hosted checkout sessions created over HTTP, webhook
/// signatures verified with a shared HMAC secret.
pub struct StripeGateway {
    http: reqwest::Client,
    config: PaymentConfig,
    orders: Arc<OrderService>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: String,
}

impl StripeGateway {
    pub fn new(config: PaymentConfig, orders: Arc<OrderService>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            orders,
        }
    }
}

/// Builds the form parameters for a hosted checkout session. Lines without a
/// positive numeric price are excluded from the payment request; if that
/// leaves nothing payable the call is rejected — custom-quoted orders must go
/// through the proposal path. The order id rides in the session metadata so
/// the webhook can correlate back.
pub(crate) fn build_session_params(
    order: &OrderModel,
    items: &[OrderItemModel],
    config: &PaymentConfig,
) -> Result<Vec<(String, String)>, ServiceError> {
    let payable: Vec<&OrderItemModel> = items
        .iter()
        .filter(|item| item.price_value.map_or(false, |v| v > Decimal::ZERO))
        .collect();

    if payable.is_empty() {
        return Err(ServiceError::NoPayableItems(
            "this order contains only custom-priced items; request a proposal instead".to_string(),
        ));
    }

    let mut params: Vec<(String, String)> = vec![
        ("mode".to_string(), "payment".to_string()),
        (
            "payment_method_types[0]".to_string(),
            "card".to_string(),
        ),
        ("metadata[order_id]".to_string(), order.id.to_string()),
        (
            "success_url".to_string(),
            format!(
                "{}?session_id={{CHECKOUT_SESSION_ID}}&order_id={}",
                config.success_url, order.id
            ),
        ),
        ("cancel_url".to_string(), config.cancel_url.clone()),
    ];

    for (i, item) in payable.iter().enumerate() {
        let cents = (item.price_value.unwrap_or(Decimal::ZERO) * Decimal::from(100))
            .trunc()
            .to_i64()
            .ok_or_else(|| {
                ServiceError::InternalError(format!("price overflow on line {}", item.position))
            })?;
        params.push((
            format!("line_items[{i}][price_data][currency]"),
            config.currency.clone(),
        ));
        params.push((
            format!("line_items[{i}][price_data][unit_amount]"),
            cents.to_string(),
        ));
        params.push((
            format!("line_items[{i}][price_data][product_data][name]"),
            item.name.clone(),
        ));
        params.push((format!("line_items[{i}][quantity]"), "1".to_string()));
    }

    Ok(params)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, session), fields(order_id = %order_id, user_id = %session.user_id))]
    async fn create_checkout_session(
        &self,
        order_id: Uuid,
        session: &Session,
    ) -> Result<String, ServiceError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.client_id != session.user_id && !session.is_admin() {
            return Err(ServiceError::Unauthorized(
                "you do not own this order".to_string(),
            ));
        }

        let items = self.orders.get_items(order_id).await?;
        let params = build_session_params(&order, &items, &self.config)?;

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .bearer_auth(&self.config.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("payment request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "payment session creation rejected");
            return Err(ServiceError::PaymentFailed(format!(
                "payment provider rejected the session ({status})"
            )));
        }

        let created: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("payment body: {e}")))?;

        tracing::info!(order_id = %order_id, session_id = %created.id, "payment session created");
        Ok(created.url)
    }
}

// ---------------------------------------------------------------------------
// Webhook signature verification
// ---------------------------------------------------------------------------

/// Verifies a `Payment-Signature: t=<ts>,v1=<hex hmac>` header over
/// `"{ts}.{payload}"`. Stale timestamps outside the tolerance are rejected.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let Some(header) = headers
        .get("Payment-Signature")
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };

    let mut ts = "";
    let mut v1 = "";
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => ts = value,
            Some(("v1", value)) => v1 = value,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    constant_time_eq(&expected_signature(secret, ts, payload), v1)
}

/// Computes the hex HMAC for a timestamped payload. Shared with the test
/// harness so webhook tests can produce valid headers.
pub fn expected_signature(secret: &str, ts: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
