use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{
    self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderKind,
    OrderStatus, PaymentState,
};
use crate::entities::order_item::{
    self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity, Model as OrderItemModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, OrderChanged};
use crate::models::product::LineItem;
use crate::services::advisory::ProjectAnalysis;

/// Everything needed to persist a draft order at the start of the payment
/// phase. The total is the caller's snapshot and is never recomputed from
/// live prices afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftOrder {
    pub client_id: Uuid,
    pub contact_name: String,
    pub contact_email: String,
    pub title: String,
    pub items: Vec<LineItem>,
    pub configurations: BTreeMap<usize, BTreeMap<String, String>>,
    pub notes: Option<String>,
    pub kind: OrderKind,
    pub total_value: Decimal,
    pub analysis: Option<ProjectAnalysis>,
}

/// Result of applying a payment-completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// `draft -> pending_approval` was applied by this call.
    Applied,
    /// The order had already left `draft`; redelivery is a no-op.
    AlreadyApplied,
}

/// Store boundary consumed by the checkout orchestrator and the payment
/// reconciler. Production is sea-orm backed; tests inject scripted stores.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_draft(&self, draft: DraftOrder) -> Result<Uuid, ServiceError>;

    /// Sole writer of the card-paid `draft -> pending_approval` transition.
    /// Must be idempotent under webhook redelivery.
    async fn mark_paid(&self, order_id: Uuid) -> Result<Reconciliation, ServiceError>;

    /// `draft -> pending_approval` for proposal/invoice orders, which skip
    /// payment entirely; payment status stays pending.
    async fn submit_proposal(&self, order_id: Uuid) -> Result<(), ServiceError>;
}

/// Order persistence with a change-notification stream. Handed its store
/// dependency explicitly; no process-wide singleton.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
    changes: broadcast::Sender<OrderChanged>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            db,
            event_sender,
            changes,
        }
    }

    /// Subscribes to order mutations for dashboard/admin live refresh.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderChanged> {
        self.changes.subscribe()
    }

    fn notify(&self, order: &OrderModel) {
        if let Ok(status) = order.status() {
            // Receiver lag or absence is not an error.
            let _ = self.changes.send(OrderChanged {
                order_id: order.id,
                client_id: order.client_id,
                status,
            });
        }
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send order event");
            }
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find_by_id(order_id).one(&*self.db).await?)
    }

    pub async fn get_items(&self, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?)
    }

    /// Client-scoped order listing, newest first.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::ClientId.eq(client_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Unfiltered listing for the admin back-office.
    pub async fn list_all(&self) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Applies an admin-driven status transition after validating it against
    /// the state machine. Invalid transitions are rejected, not applied.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let old_status = order
            .status()
            .map_err(|_| ServiceError::InternalError(format!("corrupt status {}", order.status)))?;

        if old_status == new_status {
            txn.commit().await?;
            return Ok(order);
        }
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot transition from '{old_status}' to '{new_status}'"
            )));
        }

        let version = order.version;
        let mut active: OrderActiveModel = order.into();
        active.status = Set(new_status.to_string());
        active.progress = Set(new_status.progress());
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(order_id = %order_id, %old_status, %new_status, "order status updated");
        self.send_event(Event::OrderStatusChanged {
            order_id,
            old_status,
            new_status,
        })
        .await;
        self.notify(&updated);

        Ok(updated)
    }
}

#[async_trait]
impl OrderStore for OrderService {
    /// Creates the draft order and its frozen line snapshots in one
    /// transaction. Nothing is left behind if creation fails.
    #[instrument(skip(self, draft), fields(client_id = %draft.client_id, kind = %draft.kind, total = %draft.total_value))]
    async fn create_draft(&self, draft: DraftOrder) -> Result<Uuid, ServiceError> {
        if draft.items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "cannot create an order without line items".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let configurations = serde_json::to_value(&draft.configurations)?;
        let ai_summary = draft
            .analysis
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start draft-creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = OrderActiveModel {
            id: Set(order_id),
            client_id: Set(draft.client_id),
            contact_name: Set(draft.contact_name.clone()),
            contact_email: Set(draft.contact_email.clone()),
            title: Set(draft.title.clone()),
            status: Set(OrderStatus::Draft.to_string()),
            payment_status: Set(PaymentState::Pending.to_string()),
            kind: Set(draft.kind.to_string()),
            total_value: Set(draft.total_value),
            notes: Set(draft.notes.clone()),
            configurations: Set(configurations),
            ai_summary: Set(ai_summary),
            progress: Set(OrderStatus::Draft.progress()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        let order = order.insert(&txn).await?;

        for (position, item) in draft.items.iter().enumerate() {
            let line = OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                position: Set(position as i32),
                product_id: Set(item.product_id.clone()),
                name: Set(item.name.clone()),
                category: Set(item.category.clone()),
                price: Set(item.price.clone()),
                price_value: Set(item.price_value),
                icon: Set(item.icon.map(|i| i.to_string())),
                gradient: Set(item.gradient.clone()),
                created_at: Set(now),
            };
            line.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, "draft order created");
        self.send_event(Event::OrderCreated(order_id)).await;
        self.notify(&order);

        Ok(order_id)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn mark_paid(&self, order_id: Uuid) -> Result<Reconciliation, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let status = order
            .status()
            .map_err(|_| ServiceError::InternalError(format!("corrupt status {}", order.status)))?;

        if status != OrderStatus::Draft {
            // Redelivered completion event; the transition already happened.
            txn.commit().await?;
            info!(order_id = %order_id, %status, "payment event redelivered; no-op");
            return Ok(Reconciliation::AlreadyApplied);
        }

        let version = order.version;
        let mut active: OrderActiveModel = order.into();
        active.status = Set(OrderStatus::PendingApproval.to_string());
        active.payment_status = Set(PaymentState::Paid.to_string());
        active.progress = Set(OrderStatus::PendingApproval.progress());
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(order_id = %order_id, "payment completed; order pending approval");
        self.send_event(Event::PaymentCompleted { order_id }).await;
        self.send_event(Event::OrderStatusChanged {
            order_id,
            old_status: OrderStatus::Draft,
            new_status: OrderStatus::PendingApproval,
        })
        .await;
        self.notify(&updated);

        Ok(Reconciliation::Applied)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn submit_proposal(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let status = order
            .status()
            .map_err(|_| ServiceError::InternalError(format!("corrupt status {}", order.status)))?;
        if status != OrderStatus::Draft {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot submit a proposal for an order in '{status}'"
            )));
        }

        let version = order.version;
        let mut active: OrderActiveModel = order.into();
        active.status = Set(OrderStatus::PendingApproval.to_string());
        active.progress = Set(OrderStatus::PendingApproval.progress());
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(order_id = %order_id, "proposal submitted; order pending approval");
        self.send_event(Event::OrderStatusChanged {
            order_id,
            old_status: OrderStatus::Draft,
            new_status: OrderStatus::PendingApproval,
        })
        .await;
        self.notify(&updated);

        Ok(())
    }
}
