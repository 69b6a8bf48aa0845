//! OpenAPI document for the public API, served as raw JSON at
//! `/api-docs/openapi.json`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Registers the `bearer` scheme the handler annotations reference.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Studio API",
        description = "Checkout-to-order backend for a productized development studio",
    ),
    modifiers(&SecurityAddon),
    paths(
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,
        crate::handlers::checkout::start,
        crate::handlers::checkout::submit_details,
        crate::handlers::checkout::submit_payment,
        crate::handlers::orders::admin_update_status,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::handlers::auth::RegisterRequest,
        crate::handlers::auth::LoginRequest,
        crate::handlers::checkout::StartRequest,
        crate::handlers::checkout::PaymentRequest,
        crate::handlers::orders::StatusUpdateRequest,
        crate::services::checkout::DetailsInput,
        crate::services::checkout::CheckoutView,
        crate::services::checkout::CheckoutOutcome,
        crate::services::checkout::CheckoutStep,
        crate::services::checkout::PaymentMethod,
        crate::services::advisory::ProjectAnalysis,
        crate::services::identity::Session,
        crate::services::identity::Role,
        crate::models::product::LineItem,
        crate::models::product::IconKey,
        crate::models::product::ProductKind,
    )),
    tags(
        (name = "Auth", description = "Registration and login"),
        (name = "Checkout", description = "Three-step checkout wizard"),
        (name = "Admin", description = "Back-office order management"),
        (name = "Payments", description = "Payment webhook intake"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_scheme_is_declared_for_secured_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("document has components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
