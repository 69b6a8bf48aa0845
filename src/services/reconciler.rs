//! Server-side processor for payment-completion webhooks. Runs in a
//! different execution context than the checkout wizard; the order store is
//! the only coordination channel between the two.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::orders::{OrderStore, Reconciliation};

/// The event type that flips a draft order to pending approval.
pub const COMPLETION_EVENT: &str = "checkout.session.completed";

/// How a webhook delivery was handled. Everything here is a successful
/// evaluation and answers 200; only signature failures (checked before the
/// reconciler runs) answer non-200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The order moved `draft -> pending_approval` and is now paid.
    Applied,
    /// Redelivery of an event already applied; no state change.
    AlreadyApplied,
    /// Evaluated and deliberately skipped (wrong event type, missing or
    /// unknown order).
    Ignored(&'static str),
}

pub struct OrderReconciler {
    store: Arc<dyn OrderStore>,
}

impl OrderReconciler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Applies one verified payment event. Idempotent under redelivery: the
    /// store refuses to double-transition, and that refusal is reported as
    /// success. A store outage is the only error path, so the delivery gets
    /// retried by the payment collaborator.
    #[instrument(skip(self, event))]
    pub async fn process(&self, event: &Value) -> Result<ReconcileOutcome, ServiceError> {
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
        if event_type != COMPLETION_EVENT {
            info!(event_type, "ignoring non-completion payment event");
            return Ok(ReconcileOutcome::Ignored("not a completion event"));
        }

        let order_id = event
            .pointer("/data/object/metadata/order_id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok());

        let Some(order_id) = order_id else {
            warn!("completion event carries no usable order id");
            return Ok(ReconcileOutcome::Ignored("missing order id"));
        };

        match self.store.mark_paid(order_id).await {
            Ok(Reconciliation::Applied) => Ok(ReconcileOutcome::Applied),
            Ok(Reconciliation::AlreadyApplied) => Ok(ReconcileOutcome::AlreadyApplied),
            // One malformed or stale event must not take down the receiver.
            Err(ServiceError::NotFound(_)) => {
                warn!(%order_id, "completion event for unknown order");
                Ok(ReconcileOutcome::Ignored("order not found"))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::orders::DraftOrder;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Store scripted with one known draft order; counts real transitions.
    struct ScriptedStore {
        known: Uuid,
        transitions: AtomicUsize,
        paid: Mutex<HashSet<Uuid>>,
    }

    impl ScriptedStore {
        fn new(known: Uuid) -> Self {
            Self {
                known,
                transitions: AtomicUsize::new(0),
                paid: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait]
    impl OrderStore for ScriptedStore {
        async fn create_draft(&self, _draft: DraftOrder) -> Result<Uuid, ServiceError> {
            unreachable!("reconciler never creates drafts")
        }

        async fn mark_paid(&self, order_id: Uuid) -> Result<Reconciliation, ServiceError> {
            if order_id != self.known {
                return Err(ServiceError::NotFound(format!("Order {order_id} not found")));
            }
            let mut paid = self.paid.lock().unwrap();
            if paid.contains(&order_id) {
                return Ok(Reconciliation::AlreadyApplied);
            }
            paid.insert(order_id);
            self.transitions.fetch_add(1, Ordering::SeqCst);
            Ok(Reconciliation::Applied)
        }

        async fn submit_proposal(&self, _order_id: Uuid) -> Result<(), ServiceError> {
            unreachable!("reconciler never submits proposals")
        }
    }

    fn completion_event(order_id: Uuid) -> Value {
        serde_json::json!({
            "id": "evt_1",
            "type": COMPLETION_EVENT,
            "data": { "object": { "metadata": { "order_id": order_id.to_string() } } }
        })
    }

    #[tokio::test]
    async fn redelivery_transitions_exactly_once_and_still_succeeds() {
        let order_id = Uuid::new_v4();
        let store = Arc::new(ScriptedStore::new(order_id));
        let reconciler = OrderReconciler::new(store.clone());
        let event = completion_event(order_id);

        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            ReconcileOutcome::Applied
        );
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            ReconcileOutcome::AlreadyApplied
        );
        assert_eq!(store.transitions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_orders_are_ignored_without_error() {
        let store = Arc::new(ScriptedStore::new(Uuid::new_v4()));
        let reconciler = OrderReconciler::new(store.clone());

        let outcome = reconciler
            .process(&completion_event(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Ignored("order not found"));
        assert_eq!(store.transitions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_completion_events_are_ignored() {
        let store = Arc::new(ScriptedStore::new(Uuid::new_v4()));
        let reconciler = OrderReconciler::new(store.clone());

        let event = serde_json::json!({ "type": "charge.refunded" });
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            ReconcileOutcome::Ignored("not a completion event")
        );
    }

    #[tokio::test]
    async fn events_without_order_id_are_ignored() {
        let store = Arc::new(ScriptedStore::new(Uuid::new_v4()));
        let reconciler = OrderReconciler::new(store);

        let event = serde_json::json!({
            "type": COMPLETION_EVENT,
            "data": { "object": { "metadata": {} } }
        });
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            ReconcileOutcome::Ignored("missing order id")
        );
    }
}
