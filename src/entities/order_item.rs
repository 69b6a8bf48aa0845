use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frozen snapshot of a cart line at draft-creation time. Presentation is
/// reduced to symbolic keys (`icon`, `gradient`); no renderable payload is
/// ever persisted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Uuid,

    /// Cart position this line was frozen from; keys the configuration map.
    pub position: i32,

    pub product_id: String,
    pub name: String,
    pub category: String,

    /// Display price, e.g. "€950" or the sentinel "Custom".
    pub price: String,

    /// Numeric price; absent for custom-quoted lines.
    pub price_value: Option<Decimal>,

    pub icon: Option<String>,
    pub gradient: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
