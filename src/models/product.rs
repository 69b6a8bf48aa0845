use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Display-price sentinel for custom-quoted products. Lines carrying it have
/// no numeric price and can only go through the proposal path.
pub const CUSTOM_PRICE: &str = "Custom";

/// Symbolic icon reference persisted with a product line. The presentation
/// layer resolves it to a renderable asset; the data model never carries a
/// render fragment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IconKey {
    Rocket,
    Globe,
    Server,
    Zap,
    Download,
    Settings,
    Layout,
    Database,
}

/// Explicit product classification driving configuration-schema resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductKind {
    Marketing,
    Saas,
    Generic,
}

/// A selected product line. Immutable once added to a cart: adding the same
/// product twice yields two independent lines, each removable by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub category: String,

    /// Display price string, e.g. "€950" or [`CUSTOM_PRICE`].
    pub price: String,

    /// Numeric price used for totals; absent for custom-quoted lines.
    pub price_value: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<IconKey>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<String>,

    /// Explicit classification; when absent the schema classifier falls back
    /// to name/category attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProductKind>,
}

impl LineItem {
    /// Numeric amount this line contributes to the cart total. Missing and
    /// custom prices count as zero.
    pub fn amount(&self) -> Decimal {
        self.price_value.unwrap_or(Decimal::ZERO)
    }

    pub fn is_custom_priced(&self) -> bool {
        self.price == CUSTOM_PRICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn custom_priced_lines_amount_to_zero() {
        let item = LineItem {
            product_id: "ui-kit".to_string(),
            name: "UI Kit".to_string(),
            category: "Assets".to_string(),
            price: CUSTOM_PRICE.to_string(),
            price_value: None,
            icon: Some(IconKey::Layout),
            gradient: None,
            kind: None,
        };
        assert!(item.is_custom_priced());
        assert_eq!(item.amount(), Decimal::ZERO);
    }

    #[test]
    fn icon_keys_serialize_symbolically() {
        let json = serde_json::to_string(&IconKey::Rocket).unwrap();
        assert_eq!(json, "\"rocket\"");
    }

    #[test]
    fn priced_lines_report_their_value() {
        let item = LineItem {
            product_id: "proto".to_string(),
            name: "Rapid Prototype".to_string(),
            category: "Full Builds".to_string(),
            price: "€950".to_string(),
            price_value: Some(dec!(950)),
            icon: None,
            gradient: None,
            kind: None,
        };
        assert_eq!(item.amount(), dec!(950));
    }
}
