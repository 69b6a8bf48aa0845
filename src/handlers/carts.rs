use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response};
use crate::models::product::LineItem;
use crate::models::schema::{self, ConfigField};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub cart_id: Uuid,
    pub items: Vec<LineItem>,
    pub total: Decimal,
}

/// Configuration schema resolved for one cart line, keyed by position.
#[derive(Debug, Serialize)]
pub struct LineSchema {
    pub index: usize,
    pub name: String,
    pub fields: &'static [ConfigField],
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/carts", post(create_cart))
        .route("/carts/:id", get(get_cart))
        .route("/carts/:id/items", post(add_item))
        .route("/carts/:id/items/:index", delete(remove_item))
        .route("/carts/:id/schemas", get(get_schemas))
}

fn view(state: &AppState, cart_id: Uuid) -> Result<CartView, ServiceError> {
    let items = state.services.carts.items(cart_id)?;
    let total = state.services.carts.total(cart_id)?;
    Ok(CartView {
        cart_id,
        items,
        total,
    })
}

pub async fn create_cart(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart_id = state.services.carts.create();
    Ok(created_response(view(&state, cart_id)?))
}

pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(view(&state, id)?))
}

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(item): Json<LineItem>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.add_item(id, item)?;
    Ok(success_response(view(&state, id)?))
}

pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.remove_item(id, index)?;
    Ok(success_response(view(&state, id)?))
}

/// Resolved configuration schema per line, in cart order. Drives the
/// customization step of the checkout UI.
pub async fn get_schemas(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state.services.carts.items(id)?;
    let schemas: Vec<LineSchema> = items
        .iter()
        .enumerate()
        .map(|(index, item)| LineSchema {
            index,
            name: item.name.clone(),
            fields: schema::schema_for(item),
        })
        .collect();
    Ok(success_response(schemas))
}
