use axum::{
    body::Bytes, extract::State, http::HeaderMap, response::IntoResponse, routing::post, Json,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::errors::ServiceError;
use crate::services::payments::verify_signature;
use crate::services::reconciler::ReconcileOutcome;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/payments/webhook", post(payment_webhook))
}

/// Receives payment events from the payment collaborator. Answers 401 only
/// for signature failures and 5xx only when the order store is unreachable,
/// so the sender redelivers; every evaluated event answers 200 even when it
/// is skipped.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event evaluated"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = &state.config.payment;
    if !verify_signature(
        &headers,
        &body,
        &payment.webhook_secret,
        payment.webhook_tolerance_secs,
    ) {
        warn!("payment webhook signature verification failed");
        return Err(ServiceError::SignatureInvalid);
    }

    // A signed-but-malformed body is not retryable; acknowledge and drop it.
    let event: Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "payment webhook carried unparseable json");
            return Ok(Json(json!({ "received": true, "ignored": "invalid json" })));
        }
    };

    let outcome = state.services.reconciler.process(&event).await?;
    let body = match outcome {
        ReconcileOutcome::Applied => json!({ "received": true, "applied": true }),
        ReconcileOutcome::AlreadyApplied => json!({ "received": true, "applied": false }),
        ReconcileOutcome::Ignored(reason) => json!({ "received": true, "ignored": reason }),
    };
    Ok(Json(body))
}
