use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of an order. `Draft` is created at the start of the payment
/// phase; the payment reconciler is the sole writer of the
/// `Draft -> PendingApproval` transition for card-paid orders. Everything
/// past `PendingApproval` is driven by admins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    PendingApproval,
    Approved,
    Denied,
    Analyzing,
    Building,
    Review,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Whether moving from `self` to `to` is a legal transition. Same-status
    /// transitions are treated as a no-op and allowed.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        if self == to {
            return true;
        }
        match (self, to) {
            (Draft, PendingApproval) => true,
            (PendingApproval, Approved) | (PendingApproval, Denied) => true,
            (Approved, Analyzing) => true,
            (Analyzing, Building) => true,
            (Building, Review) => true,
            (Review, Completed) => true,
            // Cancellation is reachable from any pre-completed state.
            (from, Cancelled) => from != Completed && from != Cancelled,
            _ => false,
        }
    }

    /// Fulfillment progress shown on the dashboard for each status.
    pub fn progress(self) -> i32 {
        use OrderStatus::*;
        match self {
            Draft => 0,
            PendingApproval => 10,
            Approved => 20,
            Denied => 0,
            Analyzing => 40,
            Building => 65,
            Review => 85,
            Completed => 100,
            Cancelled => 0,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Paid,
}

/// `Proposal` orders skip card payment and await a studio proposal/invoice.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderKind {
    Standard,
    Proposal,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub client_id: Uuid,
    pub contact_name: String,
    pub contact_email: String,
    pub title: String,
    pub status: String,
    pub payment_status: String,
    pub kind: String,

    /// Frozen at draft-creation time; never recomputed from live prices.
    pub total_value: Decimal,

    pub notes: Option<String>,

    /// Per-line-item configuration map, keyed by cart position.
    pub configurations: Json,

    /// Structured AI analysis attached at checkout, when available.
    pub ai_summary: Option<Json>,

    /// 0-100, advanced by downstream fulfillment.
    pub progress: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> Result<OrderStatus, strum::ParseError> {
        self.status.parse()
    }
}
