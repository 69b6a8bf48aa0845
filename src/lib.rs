//! Checkout-to-order backend for a productized development studio: carts,
//! a three-step checkout wizard, draft orders settled by card payment or
//! proposal request, webhook-driven payment reconciliation, and client/admin
//! order views.

use axum::{routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod openapi;
pub mod services;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::advisory::{AdvisoryService, HttpAdvisoryClient};
use crate::services::cart::CartRegistry;
use crate::services::checkout::CheckoutService;
use crate::services::identity::IdentityService;
use crate::services::orders::OrderService;
use crate::services::payments::StripeGateway;
use crate::services::reconciler::OrderReconciler;

/// Service container handed to the handlers through [`AppState`].
pub struct AppServices {
    pub carts: Arc<CartRegistry>,
    pub identity: Arc<IdentityService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciler: Arc<OrderReconciler>,
}

impl AppServices {
    /// Wires the production service graph: HTTP advisory client, Stripe-style
    /// payment gateway and sea-orm backed stores.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let carts = Arc::new(CartRegistry::new());
        let identity = Arc::new(IdentityService::new(
            db.clone(),
            config.jwt_secret.clone(),
            config.jwt_expiration_secs,
            event_sender.clone(),
        ));
        let orders = Arc::new(OrderService::new(db, event_sender.clone()));
        let advisory = AdvisoryService::new(
            Arc::new(HttpAdvisoryClient::new(config.advisory.clone())),
            Duration::from_millis(config.advisory.timeout_ms),
        );
        let payments = Arc::new(StripeGateway::new(config.payment.clone(), orders.clone()));
        let checkout = Arc::new(CheckoutService::new(
            carts.clone(),
            advisory,
            identity.clone(),
            orders.clone(),
            payments,
            event_sender,
        ));
        let reconciler = Arc::new(OrderReconciler::new(orders.clone()));

        Self {
            carts,
            identity,
            orders,
            checkout,
            reconciler,
        }
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}

/// Builds the full application router over a prepared state.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::health::routes())
        .nest("/api/v1", handlers::api_routes())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
