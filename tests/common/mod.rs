//! Shared harness for integration tests: an in-memory SQLite database with
//! the real service graph, plus scripted advisory and payment adapters.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use studio_api::config::{AdvisoryConfig, AppConfig, PaymentConfig};
use studio_api::db;
use studio_api::errors::ServiceError;
use studio_api::models::product::{IconKey, LineItem, CUSTOM_PRICE};
use studio_api::services::advisory::{
    AdvisoryClient, AdvisoryService, AutofillItem, ConfigSuggestion, ProjectAnalysis,
};
use studio_api::services::cart::CartRegistry;
use studio_api::services::checkout::CheckoutService;
use studio_api::services::identity::{IdentityService, Session};
use studio_api::services::orders::OrderService;
use studio_api::services::payments::PaymentGateway;
use studio_api::services::reconciler::OrderReconciler;
use studio_api::{AppServices, AppState};

pub const JWT_SECRET: &str = "integration_test_secret_key_0123456789ab";
pub const WEBHOOK_SECRET: &str = "whsec_integration_test";

pub async fn test_db() -> Arc<DatabaseConnection> {
    // One connection only: each new in-memory SQLite connection is a fresh,
    // empty database.
    let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let connection = Database::connect(opts).await.expect("sqlite connect");
    db::ensure_schema(&connection).await.expect("create tables");
    Arc::new(connection)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration_secs: 3600,
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        payment: PaymentConfig {
            secret_key: "sk_test_integration".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            webhook_tolerance_secs: 300,
            api_base: "https://payments.invalid".to_string(),
            success_url: "https://studio.example/dashboard".to_string(),
            cancel_url: "https://studio.example/".to_string(),
            currency: "eur".to_string(),
        },
        advisory: AdvisoryConfig {
            api_key: "test-key".to_string(),
            endpoint: "https://advisory.invalid".to_string(),
            model: "test-model".to_string(),
            timeout_ms: 250,
        },
    }
}

/// Scripted AI collaborator: succeeds with canned output or fails every call.
pub struct ScriptedAdvisory {
    pub fail: bool,
    pub analyze_calls: AtomicUsize,
    pub autofill_calls: AtomicUsize,
}

impl ScriptedAdvisory {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            analyze_calls: AtomicUsize::new(0),
            autofill_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AdvisoryClient for ScriptedAdvisory {
    async fn analyze(&self, _text: &str) -> Result<ProjectAnalysis, ServiceError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::ExternalServiceError("model down".to_string()));
        }
        Ok(ProjectAnalysis {
            feasibility: "High".to_string(),
            stack_recommendation: "Next.js + Supabase".to_string(),
            estimated_timeline: "48 Hour MVP".to_string(),
            agentic_insight: "An agent can scaffold the data model overnight".to_string(),
        })
    }

    async fn autofill(
        &self,
        items: &[AutofillItem],
        _text: &str,
    ) -> Result<Vec<ConfigSuggestion>, ServiceError> {
        self.autofill_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::ExternalServiceError("model down".to_string()));
        }
        Ok(items
            .iter()
            .filter_map(|item| {
                let key = item.field_keys.first()?;
                let mut values = BTreeMap::new();
                values.insert(key.clone(), "Minimal & Clean".to_string());
                Some(ConfigSuggestion {
                    item_index: item.index,
                    values,
                })
            })
            .collect())
    }
}

/// Scripted payment gateway: pops one scripted result per call, defaulting
/// to success once the script is exhausted.
pub struct ScriptedGateway {
    pub calls: AtomicUsize,
    script: Mutex<Vec<GatewayStep>>,
}

pub enum GatewayStep {
    Succeed,
    Fail,
}

impl ScriptedGateway {
    pub fn new(script: Vec<GatewayStep>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script),
        }
    }

    pub fn always_succeeding() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout_session(
        &self,
        order_id: Uuid,
        _session: &Session,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                GatewayStep::Succeed
            } else {
                script.remove(0)
            }
        };
        match step {
            GatewayStep::Succeed => Ok(format!("https://payments.invalid/session/{order_id}")),
            GatewayStep::Fail => Err(ServiceError::PaymentFailed(
                "payment provider rejected the session (502)".to_string(),
            )),
        }
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub advisory: Arc<ScriptedAdvisory>,
    pub gateway: Arc<ScriptedGateway>,
}

/// Builds the real service graph over in-memory SQLite, with scripted
/// advisory and payment adapters.
pub async fn spawn_app(advisory: ScriptedAdvisory, gateway: ScriptedGateway) -> TestApp {
    let config = test_config();
    let connection = test_db().await;

    let advisory = Arc::new(advisory);
    let gateway = Arc::new(gateway);

    let carts = Arc::new(CartRegistry::new());
    let identity = Arc::new(IdentityService::new(
        connection.clone(),
        config.jwt_secret.clone(),
        config.jwt_expiration_secs,
        None,
    ));
    let orders = Arc::new(OrderService::new(connection.clone(), None));
    let checkout = Arc::new(CheckoutService::new(
        carts.clone(),
        AdvisoryService::new(advisory.clone(), Duration::from_millis(config.advisory.timeout_ms)),
        identity.clone(),
        orders.clone(),
        gateway.clone(),
        None,
    ));
    let reconciler = Arc::new(OrderReconciler::new(orders.clone()));

    let state = Arc::new(AppState {
        config,
        db: connection,
        services: AppServices {
            carts,
            identity,
            orders,
            checkout,
            reconciler,
        },
    });

    TestApp {
        state,
        advisory,
        gateway,
    }
}

pub fn line(name: &str, category: &str, value: Option<Decimal>) -> LineItem {
    LineItem {
        product_id: name.to_lowercase().replace(' ', "-"),
        name: name.to_string(),
        category: category.to_string(),
        price: value
            .map(|v| format!("€{v}"))
            .unwrap_or_else(|| CUSTOM_PRICE.to_string()),
        price_value: value,
        icon: Some(IconKey::Rocket),
        gradient: None,
        kind: None,
    }
}

pub fn completion_event(order_id: Uuid) -> serde_json::Value {
    serde_json::json!({
        "id": format!("evt_{order_id}"),
        "type": "checkout.session.completed",
        "data": { "object": { "metadata": { "order_id": order_id.to_string() } } }
    })
}
