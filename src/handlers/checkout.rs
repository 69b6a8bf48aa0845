use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::common::{created_response, maybe_session, success_response};
use crate::services::checkout::{Configurations, DetailsInput, PaymentMethod};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRequest {
    pub cart_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomizationRequest {
    #[serde(default)]
    pub configurations: Option<Configurations>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkout", post(start))
        .route("/checkout/:id", get(view))
        .route("/checkout/:id/details", post(submit_details))
        .route("/checkout/:id/back", post(go_back))
        .route("/checkout/:id/autofill", post(autofill))
        .route("/checkout/:id/customization", post(submit_customization))
        .route("/checkout/:id/payment", post(submit_payment))
        .route("/checkout/:id/items/:index", delete(remove_line))
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = StartRequest,
    responses(
        (status = 201, description = "Wizard opened at the Details step", body = crate::services::checkout::CheckoutView),
        (status = 400, description = "Cart is empty", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = maybe_session(&state, &headers).await;
    let view = state
        .services
        .checkout
        .start(payload.cart_id, session.as_ref())
        .await?;
    Ok(created_response(view))
}

pub async fn view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.checkout.view(id)?))
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/{id}/details",
    request_body = DetailsInput,
    responses(
        (status = 200, description = "Advanced to Customization", body = crate::services::checkout::CheckoutView),
        (status = 400, description = "Missing contact fields or weak password", body = crate::errors::ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Checkout session id")),
    tag = "Checkout"
)]
pub async fn submit_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<DetailsInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = maybe_session(&state, &headers).await;
    let view = state
        .services
        .checkout
        .submit_details(id, payload, session.as_ref())
        .await?;
    Ok(success_response(view))
}

pub async fn go_back(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.checkout.go_back(id)?))
}

pub async fn autofill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.checkout.autofill(id).await?))
}

pub async fn submit_customization(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CustomizationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .services
        .checkout
        .submit_customization(id, payload.configurations)
        .await?;
    Ok(success_response(view))
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/{id}/payment",
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Redirect URL or submitted proposal", body = crate::services::checkout::CheckoutOutcome),
        (status = 401, description = "No session and account creation declined", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment provider rejected the session", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Checkout session id")),
    tag = "Checkout"
)]
pub async fn submit_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<PaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = maybe_session(&state, &headers).await;
    let outcome = state
        .services
        .checkout
        .submit_payment(id, payload.method, session.as_ref())
        .await?;
    Ok(success_response(outcome))
}

pub async fn remove_line(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.checkout.remove_line(id, index)?))
}
