//! Static configuration schemas and the product classifier that resolves a
//! cart line to exactly one of them.

use serde::Serialize;

use super::product::{LineItem, ProductKind};

/// Input kind a configuration field renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-select dropdown
    Select,
    /// Exclusive choice buttons
    Choice,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub options: &'static [&'static str],
}

const MARKETING_FIELDS: &[ConfigField] = &[
    ConfigField {
        key: "aesthetic",
        label: "Visual Aesthetic",
        kind: FieldKind::Select,
        options: &[
            "Minimal & Clean",
            "Brutalist & Bold",
            "Corporate & Trust",
            "Playful & Vibrant",
            "Dark Mode / Cyberpunk",
            "Luxury & Serif",
        ],
    },
    ConfigField {
        key: "typography",
        label: "Typography Style",
        kind: FieldKind::Select,
        options: &[
            "Sans Serif (Inter/Geist)",
            "Serif (Playfair/Merriweather)",
            "Monospace (JetBrains/Fira)",
            "Mixed",
        ],
    },
    ConfigField {
        key: "primary_color",
        label: "Primary Brand Color",
        kind: FieldKind::Select,
        options: &[
            "Blue", "Green", "Purple", "Orange", "Red", "Black/White", "Yellow", "Teal",
        ],
    },
];

const SAAS_FIELDS: &[ConfigField] = &[
    ConfigField {
        key: "auth_provider",
        label: "Authentication Provider",
        kind: FieldKind::Choice,
        options: &["Supabase Auth", "Firebase Auth", "Clerk", "NextAuth", "None"],
    },
    ConfigField {
        key: "database",
        label: "Database Preference",
        kind: FieldKind::Select,
        options: &[
            "PostgreSQL (Supabase)",
            "Firestore (Firebase)",
            "MongoDB",
            "MySQL",
        ],
    },
    ConfigField {
        key: "payments",
        label: "Payment Gateway",
        kind: FieldKind::Choice,
        options: &["Stripe", "LemonSqueezy", "None"],
    },
    ConfigField {
        key: "aesthetic",
        label: "Dashboard Style",
        kind: FieldKind::Select,
        options: &[
            "Sidebar Navigation",
            "Top Bar Navigation",
            "Dense Data Grid",
            "Card Based",
        ],
    },
];

const GENERIC_FIELDS: &[ConfigField] = &[ConfigField {
    key: "delivery_format",
    label: "Delivery Format",
    kind: FieldKind::Select,
    options: &["GitHub Repository", "Zip Archive", "Vercel Deploy Invite"],
}];

/// Classifies a product line. An explicit `kind` on the item wins; otherwise
/// classification is a pure function of name/category attributes with a
/// deterministic precedence: within build-type products the marketing/landing
/// check runs before the SaaS fallback. Never consults order history.
pub fn classify(item: &LineItem) -> ProductKind {
    if let Some(kind) = item.kind {
        return kind;
    }

    let name = item.name.to_lowercase();
    let category = item.category.to_lowercase();

    if category.contains("full builds") || name.contains("prototype") {
        if name.contains("marketing") || name.contains("landing") {
            return ProductKind::Marketing;
        }
        return ProductKind::Saas;
    }
    ProductKind::Generic
}

pub fn fields_for(kind: ProductKind) -> &'static [ConfigField] {
    match kind {
        ProductKind::Marketing => MARKETING_FIELDS,
        ProductKind::Saas => SAAS_FIELDS,
        ProductKind::Generic => GENERIC_FIELDS,
    }
}

/// Resolves the configuration schema for a cart line. Every line resolves to
/// exactly one schema.
pub fn schema_for(item: &LineItem) -> &'static [ConfigField] {
    fields_for(classify(item))
}

/// Field keys a line's schema declares, in schema order. This is the set the
/// AI autofill is allowed to propose values for.
pub fn field_keys(item: &LineItem) -> Vec<String> {
    schema_for(item).iter().map(|f| f.key.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, category: &str) -> LineItem {
        LineItem {
            product_id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            category: category.to_string(),
            price: "€950".to_string(),
            price_value: None,
            icon: None,
            gradient: None,
            kind: None,
        }
    }

    #[test]
    fn landing_prototype_resolves_to_marketing() {
        assert_eq!(
            classify(&item("Landing Page Prototype", "Full Builds")),
            ProductKind::Marketing
        );
    }

    #[test]
    fn saas_prototype_resolves_to_saas() {
        assert_eq!(
            classify(&item("SaaS Prototype", "Full Builds")),
            ProductKind::Saas
        );
    }

    #[test]
    fn assets_resolve_to_generic() {
        assert_eq!(classify(&item("UI Kit", "Assets")), ProductKind::Generic);
    }

    #[test]
    fn marketing_check_precedes_saas_fallback() {
        // A product naming both concerns lands on marketing deterministically.
        assert_eq!(
            classify(&item("SaaS-style Landing Page Prototype", "Full Builds")),
            ProductKind::Marketing
        );
    }

    #[test]
    fn explicit_kind_overrides_attribute_sniffing() {
        let mut i = item("Landing Page Prototype", "Full Builds");
        i.kind = Some(ProductKind::Generic);
        assert_eq!(classify(&i), ProductKind::Generic);
    }

    #[test]
    fn every_line_resolves_to_exactly_one_schema() {
        for (name, category) in [
            ("Landing Page Prototype", "Full Builds"),
            ("SaaS Prototype", "Full Builds"),
            ("UI Kit", "Assets"),
        ] {
            assert!(!schema_for(&item(name, category)).is_empty());
        }
    }

    #[test]
    fn field_keys_match_schema_order() {
        let keys = field_keys(&item("SaaS Prototype", "Full Builds"));
        assert_eq!(keys, vec!["auth_provider", "database", "payments", "aesthetic"]);
    }
}
