use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{Model as OrderModel, OrderStatus};
use crate::entities::order_item::Model as OrderItemModel;
use crate::errors::ServiceError;
use crate::handlers::common::{require_admin, require_session, success_response};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentReturnQuery {
    pub order_id: Uuid,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_my_orders))
        .route("/orders/:id", get(get_order))
        .route("/dashboard/payment-return", get(payment_return))
        .route("/admin/orders", get(admin_list_orders))
        .route("/admin/orders/:id/status", put(admin_update_status))
}

/// Client dashboard listing: the caller's own orders, newest first.
pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let session = require_session(&state, &headers).await?;
    let orders = state.services.orders.list_for_client(session.user_id).await?;
    Ok(success_response(orders))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let session = require_session(&state, &headers).await?;
    let order = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;

    if order.client_id != session.user_id && !session.is_admin() {
        // Hide existence from non-owners.
        return Err(ServiceError::NotFound(format!("Order {id} not found")));
    }

    let items = state.services.orders.get_items(id).await?;
    Ok(success_response(OrderDetail { order, items }))
}

/// Landing ack for the hosted-payment return redirect. Advisory only: the
/// reported status is whatever the webhook has (or has not yet) reconciled,
/// so a still-draft order here just means the webhook is in flight.
pub async fn payment_return(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentReturnQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let session = require_session(&state, &headers).await?;
    let order = state
        .services
        .orders
        .get_order(query.order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", query.order_id)))?;

    if order.client_id != session.user_id && !session.is_admin() {
        return Err(ServiceError::NotFound(format!(
            "Order {} not found",
            query.order_id
        )));
    }

    Ok(success_response(serde_json::json!({
        "order_id": order.id,
        "status": order.status,
        "payment_status": order.payment_status,
        "progress": order.progress,
        "settled": order.status != OrderStatus::Draft.to_string(),
    })))
}

/// Admin back-office listing across all clients.
pub async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let session = require_session(&state, &headers).await?;
    require_admin(&session)?;
    let orders = state.services.orders.list_all().await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Transition rejected by the state machine", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::errors::ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Order id")),
    security(("bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = require_session(&state, &headers).await?;
    require_admin(&session)?;

    let status: OrderStatus = payload
        .status
        .parse()
        .map_err(|_| ServiceError::InvalidStatus(format!("unknown status '{}'", payload.status)))?;

    let updated = state.services.orders.update_status(id, status).await?;
    Ok(success_response(updated))
}
