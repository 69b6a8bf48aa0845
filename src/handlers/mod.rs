use axum::Router;
use std::sync::Arc;

use crate::AppState;

pub mod auth;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;

/// All API routes, nested under `/api/v1` by the router in `lib.rs`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(carts::routes())
        .merge(checkout::routes())
        .merge(orders::routes())
        .merge(payment_webhooks::routes())
}
