//! The checkout wizard: a three-step controller (Details -> Customization ->
//! Payment) that owns the draft-order lifecycle. One wizard instance drives
//! one checkout attempt; an in-flight flag on the session guards against
//! double submission while an adapter call is pending.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::OrderKind;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::product::LineItem;
use crate::models::schema;
use crate::services::advisory::{AdvisoryService, AutofillItem, ConfigSuggestion, ProjectAnalysis};
use crate::services::cart::CartRegistry;
use crate::services::identity::{IdentityProvider, Session, MIN_PASSWORD_LEN};
use crate::services::orders::{DraftOrder, OrderStore};
use crate::services::payments::PaymentGateway;

/// Orders above this total qualify for the proposal/invoice path.
const INVOICE_THRESHOLD: u32 = 2000;

/// Wizards idle longer than this are dropped on the next `start` call.
/// Abandoned checkouts have no server-side state worth keeping: the cart is
/// untouched and any draft order already persisted survives on its own.
const WIZARD_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub type Configurations = BTreeMap<usize, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    Details,
    Customization,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Invoice,
}

/// Mutable draft spanning all three wizard steps. Lives only in wizard
/// memory until the Payment step persists a draft order; never partially
/// written to the store.
#[derive(Debug, Clone, Default)]
pub struct CheckoutForm {
    pub contact_name: String,
    pub contact_email: String,
    pub password: Option<String>,
    pub create_account: bool,
    pub project_name: String,
    pub description: String,
    pub configurations: Configurations,
    pub analysis: Option<ProjectAnalysis>,
}

#[derive(Debug, Clone)]
struct WizardState {
    id: Uuid,
    cart_id: Uuid,
    step: CheckoutStep,
    form: CheckoutForm,
    in_flight: bool,
    touched_at: Instant,
}

/// Details-step submission payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DetailsInput {
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub create_account: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Snapshot of a wizard instance returned to the client after every action.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutView {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub step: CheckoutStep,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub contact_name: String,
    pub contact_email: String,
    pub project_name: String,
    pub description: String,
    pub create_account: bool,
    pub configurations: Configurations,
    pub analysis: Option<ProjectAnalysis>,
    pub offered_methods: Vec<PaymentMethod>,
}

/// Terminal result of the Payment step.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// Card path: the browser must perform a full redirect to `url`.
    /// Completion is observed later via the return redirect (advisory) and
    /// the payment webhook (authoritative).
    Redirect { order_id: Uuid, url: String },
    /// Invoice path: no external redirect; the cart has been cleared.
    ProposalSubmitted { order_id: Uuid },
}

pub struct CheckoutService {
    sessions: DashMap<Uuid, WizardState>,
    carts: Arc<CartRegistry>,
    advisory: AdvisoryService,
    identity: Arc<dyn IdentityProvider>,
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

/// Computes which payment methods the Payment step offers. The invoice path
/// opens above the threshold or whenever any line is custom-quoted.
pub fn offered_methods(items: &[LineItem]) -> Vec<PaymentMethod> {
    let total: Decimal = items.iter().map(LineItem::amount).sum();
    let custom = items.iter().any(LineItem::is_custom_priced);
    if total > Decimal::from(INVOICE_THRESHOLD) || custom {
        vec![PaymentMethod::Card, PaymentMethod::Invoice]
    } else {
        vec![PaymentMethod::Card]
    }
}

/// Merge policy for AI-proposed configuration values: proposals overwrite
/// existing selections, matching observed product behavior. Changing to
/// fill-only-empty is a one-line policy swap here.
fn apply_suggestions(configurations: &mut Configurations, suggestions: Vec<ConfigSuggestion>) {
    for suggestion in suggestions {
        let entry = configurations.entry(suggestion.item_index).or_default();
        for (key, value) in suggestion.values {
            entry.insert(key, value);
        }
    }
}

/// Drops configuration entries for unknown positions and for field keys the
/// line's schema does not declare.
fn sanitize_configurations(items: &[LineItem], configurations: Configurations) -> Configurations {
    configurations
        .into_iter()
        .filter_map(|(index, mut values)| {
            let item = items.get(index)?;
            let declared = schema::field_keys(item);
            values.retain(|key, _| declared.contains(key));
            Some((index, values))
        })
        .collect()
}

impl CheckoutService {
    pub fn new(
        carts: Arc<CartRegistry>,
        advisory: AdvisoryService,
        identity: Arc<dyn IdentityProvider>,
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            carts,
            advisory,
            identity,
            orders,
            payments,
            event_sender,
        }
    }

    /// Opens a wizard over a non-empty cart. Contact fields are pre-filled
    /// from the session when one exists; `create_account` defaults to true
    /// only for guests.
    #[instrument(skip(self, session), fields(cart_id = %cart_id))]
    pub async fn start(
        &self,
        cart_id: Uuid,
        session: Option<&Session>,
    ) -> Result<CheckoutView, ServiceError> {
        self.sweep(WIZARD_IDLE_TTL);

        let items = self.carts.items(cart_id)?;
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "your cart is empty; browse services first".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let form = CheckoutForm {
            contact_name: session.map(|s| s.name.clone()).unwrap_or_default(),
            contact_email: session.map(|s| s.email.clone()).unwrap_or_default(),
            create_account: session.is_none(),
            ..CheckoutForm::default()
        };
        let state = WizardState {
            id,
            cart_id,
            step: CheckoutStep::Details,
            form,
            in_flight: false,
            touched_at: Instant::now(),
        };
        self.sessions.insert(id, state);

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::CheckoutStarted { session_id: id, cart_id }).await {
                warn!(error = %e, "failed to send checkout started event");
            }
        }

        self.view(id)
    }

    pub fn view(&self, id: Uuid) -> Result<CheckoutView, ServiceError> {
        let state = self
            .sessions
            .get(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Checkout session {id} not found")))?;
        self.render(&state)
    }

    fn render(&self, state: &WizardState) -> Result<CheckoutView, ServiceError> {
        let items = self.carts.items(state.cart_id)?;
        let total = items.iter().map(LineItem::amount).sum();
        let offered = offered_methods(&items);
        Ok(CheckoutView {
            id: state.id,
            cart_id: state.cart_id,
            step: state.step,
            items,
            total,
            contact_name: state.form.contact_name.clone(),
            contact_email: state.form.contact_email.clone(),
            project_name: state.form.project_name.clone(),
            description: state.form.description.clone(),
            create_account: state.form.create_account,
            configurations: state.form.configurations.clone(),
            analysis: state.form.analysis.clone(),
            offered_methods: offered,
        })
    }

    /// Claims the wizard for one operation; concurrent submissions are
    /// rejected instead of queued, mirroring a disabled submit button.
    fn claim(&self, id: Uuid, expected: CheckoutStep) -> Result<WizardState, ServiceError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Checkout session {id} not found")))?;
        if entry.in_flight {
            return Err(ServiceError::Conflict(
                "another checkout operation is still processing".to_string(),
            ));
        }
        if entry.step != expected {
            return Err(ServiceError::InvalidOperation(format!(
                "this action is not available at the {:?} step",
                entry.step
            )));
        }
        entry.in_flight = true;
        entry.touched_at = Instant::now();
        Ok(entry.clone())
    }

    /// Releases the wizard, persisting `state` as the new snapshot.
    fn release(&self, mut state: WizardState) {
        state.in_flight = false;
        state.touched_at = Instant::now();
        self.sessions.insert(state.id, state);
    }

    /// Drops wizards idle longer than `idle_for`. In-flight sessions are
    /// never evicted. Returns the number removed.
    pub fn sweep(&self, idle_for: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, state| state.in_flight || state.touched_at.elapsed() <= idle_for);
        before - self.sessions.len()
    }

    /// Details -> Customization. Requires contact name and email; triggers a
    /// bounded, best-effort idea analysis whose failure never blocks the
    /// transition.
    #[instrument(skip(self, input, session), fields(session_id = %id))]
    pub async fn submit_details(
        &self,
        id: Uuid,
        input: DetailsInput,
        session: Option<&Session>,
    ) -> Result<CheckoutView, ServiceError> {
        let mut state = self.claim(id, CheckoutStep::Details)?;

        let result = self.apply_details(&mut state, input, session).await;
        match result {
            Ok(()) => {
                state.step = CheckoutStep::Customization;
                let view = self.render(&state);
                self.release(state);
                view
            }
            Err(e) => {
                // Stay on Details; resubmission is re-enabled.
                self.release(state);
                Err(e)
            }
        }
    }

    async fn apply_details(
        &self,
        state: &mut WizardState,
        input: DetailsInput,
        session: Option<&Session>,
    ) -> Result<(), ServiceError> {
        match session {
            Some(s) => {
                // Authenticated contact fields are fixed to the session.
                state.form.contact_name = s.name.clone();
                state.form.contact_email = s.email.clone();
                state.form.create_account = false;
                state.form.password = None;
            }
            None => {
                let name = input.contact_name.trim();
                let email = input.contact_email.trim();
                if name.is_empty() || email.is_empty() {
                    return Err(ServiceError::ValidationError(
                        "contact name and email are required".to_string(),
                    ));
                }
                if !email.contains('@') {
                    return Err(ServiceError::ValidationError(
                        "a valid email address is required".to_string(),
                    ));
                }
                state.form.contact_name = name.to_string();
                state.form.contact_email = email.to_string();
                state.form.create_account = input.create_account.unwrap_or(true);
                if state.form.create_account {
                    let password = input.password.clone().unwrap_or_default();
                    if password.len() < MIN_PASSWORD_LEN {
                        return Err(ServiceError::WeakCredential(format!(
                            "please provide a password of at least {MIN_PASSWORD_LEN} characters to create your account"
                        )));
                    }
                    state.form.password = Some(password);
                } else {
                    state.form.password = None;
                }
            }
        }

        state.form.project_name = input.project_name.trim().to_string();
        state.form.description = input.description.trim().to_string();

        // Best-effort: attached on success, absent on failure or short input.
        state.form.analysis = self.advisory.analyze_idea(&state.form.description).await;
        Ok(())
    }

    /// Back navigation: Payment -> Customization, Customization -> Details.
    pub fn go_back(&self, id: Uuid) -> Result<CheckoutView, ServiceError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Checkout session {id} not found")))?;
        if entry.in_flight {
            return Err(ServiceError::Conflict(
                "another checkout operation is still processing".to_string(),
            ));
        }
        entry.step = match entry.step {
            CheckoutStep::Payment => CheckoutStep::Customization,
            CheckoutStep::Customization => CheckoutStep::Details,
            CheckoutStep::Details => {
                return Err(ServiceError::InvalidOperation(
                    "already at the first step".to_string(),
                ))
            }
        };
        entry.touched_at = Instant::now();
        let state = entry.clone();
        drop(entry);
        self.render(&state)
    }

    /// Explicit auto-configure action on the Customization step. Failures
    /// degrade to "no suggestions"; the wizard never blocks on the AI.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn autofill(&self, id: Uuid) -> Result<CheckoutView, ServiceError> {
        let mut state = self.claim(id, CheckoutStep::Customization)?;

        let items = match self.carts.items(state.cart_id) {
            Ok(items) => items,
            Err(e) => {
                self.release(state);
                return Err(e);
            }
        };
        let autofill_items: Vec<AutofillItem> = items
            .iter()
            .enumerate()
            .map(|(index, item)| AutofillItem {
                index,
                name: item.name.clone(),
                category: item.category.clone(),
                field_keys: schema::field_keys(item),
            })
            .collect();

        let suggestions = self
            .advisory
            .autofill_config(&autofill_items, &state.form.description)
            .await;
        apply_suggestions(&mut state.form.configurations, suggestions);

        let view = self.render(&state);
        self.release(state);
        view
    }

    /// Customization -> Payment. All configuration fields are optional by
    /// design, so the forward transition is unconditional; submitted values
    /// are sanitized against each line's schema.
    #[instrument(skip(self, configurations), fields(session_id = %id))]
    pub async fn submit_customization(
        &self,
        id: Uuid,
        configurations: Option<Configurations>,
    ) -> Result<CheckoutView, ServiceError> {
        let mut state = self.claim(id, CheckoutStep::Customization)?;

        if let Some(configurations) = configurations {
            match self.carts.items(state.cart_id) {
                Ok(items) => {
                    state.form.configurations = sanitize_configurations(&items, configurations);
                }
                Err(e) => {
                    self.release(state);
                    return Err(e);
                }
            }
        }

        state.step = CheckoutStep::Payment;
        let view = self.render(&state);
        self.release(state);
        view
    }

    /// Payment submit: identity resolution, draft creation, settlement.
    /// Failure at any step surfaces the triggering error, stays on the
    /// Payment step and re-enables resubmission; a draft created before a
    /// later failure deliberately survives for retry.
    #[instrument(skip(self, session), fields(session_id = %id, ?method))]
    pub async fn submit_payment(
        &self,
        id: Uuid,
        method: PaymentMethod,
        session: Option<&Session>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let state = self.claim(id, CheckoutStep::Payment)?;

        let result = self.settle(&state, method, session).await;
        match result {
            Ok(outcome) => {
                if let CheckoutOutcome::ProposalSubmitted { order_id } = &outcome {
                    // Invoice path completes locally: clear the cart and
                    // retire the wizard.
                    if let Err(e) = self.carts.clear(state.cart_id) {
                        warn!(error = %e, "failed to clear cart after proposal");
                    }
                    self.sessions.remove(&id);
                    if let Some(sender) = &self.event_sender {
                        let _ = sender
                            .send(Event::CheckoutCompleted {
                                session_id: id,
                                order_id: *order_id,
                            })
                            .await;
                    }
                } else {
                    // Card path: the browser leaves for the payment page; the
                    // wizard stays available in case the user navigates back.
                    self.release(state);
                }
                Ok(outcome)
            }
            Err(e) => {
                self.release(state);
                Err(e)
            }
        }
    }

    async fn settle(
        &self,
        state: &WizardState,
        method: PaymentMethod,
        session: Option<&Session>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let items = self.carts.items(state.cart_id)?;
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "your cart is empty".to_string(),
            ));
        }
        if method == PaymentMethod::Invoice && !offered_methods(&items).contains(&PaymentMethod::Invoice)
        {
            return Err(ServiceError::InvalidOperation(
                "the proposal path is not available for this order".to_string(),
            ));
        }

        // 1. Identity resolution. Registration failures (including an
        // existing account) block submission before any order is written.
        let active: Session = match session {
            Some(s) => s.clone(),
            None => {
                if !state.form.create_account {
                    return Err(ServiceError::Unauthorized(
                        "please create an account or log in to continue".to_string(),
                    ));
                }
                let password = state.form.password.clone().unwrap_or_default();
                if password.len() < MIN_PASSWORD_LEN {
                    return Err(ServiceError::WeakCredential(format!(
                        "please provide a password of at least {MIN_PASSWORD_LEN} characters to create your account"
                    )));
                }
                self.identity
                    .register(&state.form.contact_email, &password, &state.form.contact_name)
                    .await?
            }
        };

        // 2. Draft creation. Session contact values take precedence over the
        // form; the total is frozen here.
        let total: Decimal = items.iter().map(LineItem::amount).sum();
        let contact_name = if active.name.is_empty() {
            state.form.contact_name.clone()
        } else {
            active.name.clone()
        };
        let contact_email = if active.email.is_empty() {
            state.form.contact_email.clone()
        } else {
            active.email.clone()
        };
        let title = if state.form.project_name.is_empty() {
            "Untitled Project".to_string()
        } else {
            state.form.project_name.clone()
        };

        let draft = DraftOrder {
            client_id: active.user_id,
            contact_name,
            contact_email,
            title,
            items: items.clone(),
            configurations: state.form.configurations.clone(),
            notes: (!state.form.description.is_empty()).then(|| state.form.description.clone()),
            kind: match method {
                PaymentMethod::Invoice => OrderKind::Proposal,
                PaymentMethod::Card => OrderKind::Standard,
            },
            total_value: total,
            analysis: state.form.analysis.clone(),
        };
        let order_id = self.orders.create_draft(draft).await?;

        // 3. Settlement. A failure past this point leaves the draft behind
        // for retry; that orphan is deliberate, not rolled back.
        match method {
            PaymentMethod::Card => {
                let url = self.payments.create_checkout_session(order_id, &active).await?;
                info!(%order_id, "redirecting to hosted payment page");
                Ok(CheckoutOutcome::Redirect { order_id, url })
            }
            PaymentMethod::Invoice => {
                self.orders.submit_proposal(order_id).await?;
                info!(%order_id, "proposal request submitted");
                Ok(CheckoutOutcome::ProposalSubmitted { order_id })
            }
        }
    }

    /// Remove-line passthrough for the order summary panel.
    pub fn remove_line(&self, id: Uuid, index: usize) -> Result<CheckoutView, ServiceError> {
        let state = self
            .sessions
            .get(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Checkout session {id} not found")))?
            .clone();
        self.carts.remove_item(state.cart_id, index)?;
        self.render(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::{IconKey, CUSTOM_PRICE};
    use crate::services::advisory::AdvisoryClient;
    use crate::services::orders::Reconciliation;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FailingAdvisory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AdvisoryClient for FailingAdvisory {
        async fn analyze(&self, _text: &str) -> Result<ProjectAnalysis, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::ExternalServiceError("model down".to_string()))
        }

        async fn autofill(
            &self,
            _items: &[AutofillItem],
            _text: &str,
        ) -> Result<Vec<ConfigSuggestion>, ServiceError> {
            Err(ServiceError::ExternalServiceError("model down".to_string()))
        }
    }

    struct CountingIdentity {
        registers: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for CountingIdentity {
        async fn register(
            &self,
            email: &str,
            _password: &str,
            name: &str,
        ) -> Result<Session, ServiceError> {
            self.registers.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                user_id: Uuid::new_v4(),
                name: name.to_string(),
                email: email.to_string(),
                role: crate::services::identity::Role::Client,
                token: "token".to_string(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        }

        async fn login(&self, _email: &str, _password: &str) -> Result<Session, ServiceError> {
            Err(ServiceError::InvalidCredentials)
        }

        async fn session_from_token(&self, _token: &str) -> Option<Session> {
            None
        }
    }

    struct CountingStore {
        creates: AtomicUsize,
    }

    #[async_trait]
    impl OrderStore for CountingStore {
        async fn create_draft(&self, _draft: DraftOrder) -> Result<Uuid, ServiceError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::new_v4())
        }

        async fn mark_paid(&self, _order_id: Uuid) -> Result<Reconciliation, ServiceError> {
            Ok(Reconciliation::Applied)
        }

        async fn submit_proposal(&self, _order_id: Uuid) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    struct CountingGateway {
        sessions: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn create_checkout_session(
            &self,
            _order_id: Uuid,
            _session: &Session,
        ) -> Result<String, ServiceError> {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok("https://pay.example/session".to_string())
        }
    }

    struct Harness {
        carts: Arc<CartRegistry>,
        identity: Arc<CountingIdentity>,
        store: Arc<CountingStore>,
        gateway: Arc<CountingGateway>,
        service: CheckoutService,
    }

    fn harness() -> Harness {
        let carts = Arc::new(CartRegistry::new());
        let advisory_client = Arc::new(FailingAdvisory {
            calls: AtomicUsize::new(0),
        });
        let identity = Arc::new(CountingIdentity {
            registers: AtomicUsize::new(0),
        });
        let store = Arc::new(CountingStore {
            creates: AtomicUsize::new(0),
        });
        let gateway = Arc::new(CountingGateway {
            sessions: AtomicUsize::new(0),
        });
        let service = CheckoutService::new(
            carts.clone(),
            AdvisoryService::new(advisory_client, Duration::from_millis(100)),
            identity.clone(),
            store.clone(),
            gateway.clone(),
            None,
        );
        Harness {
            carts,
            identity,
            store,
            gateway,
            service,
        }
    }

    fn line(name: &str, value: Option<Decimal>) -> LineItem {
        LineItem {
            product_id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            category: "Full Builds".to_string(),
            price: value
                .map(|v| format!("€{v}"))
                .unwrap_or_else(|| CUSTOM_PRICE.to_string()),
            price_value: value,
            icon: Some(IconKey::Rocket),
            gradient: None,
            kind: None,
        }
    }

    fn details(create_account: bool) -> DetailsInput {
        DetailsInput {
            contact_name: "Ada".to_string(),
            contact_email: "ada@example.com".to_string(),
            project_name: "Camera marketplace".to_string(),
            description: "A marketplace for renting cameras in Berlin".to_string(),
            create_account: Some(create_account),
            password: create_account.then(|| "secret1".to_string()),
        }
    }

    #[tokio::test]
    async fn empty_cart_cannot_enter_the_wizard() {
        let h = harness();
        let cart_id = h.carts.create();
        let result = h.service.start(cart_id, None).await;
        assert!(matches!(result, Err(ServiceError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn details_requires_contact_fields_regardless_of_description() {
        let h = harness();
        let cart_id = h.carts.create();
        h.carts.add_item(cart_id, line("Rapid Prototype", Some(dec!(950)))).unwrap();
        let view = h.service.start(cart_id, None).await.unwrap();

        let mut input = details(true);
        input.contact_email = String::new();
        let result = h.service.submit_details(view.id, input, None).await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        // Still on Details; forward steps remain gated.
        assert_eq!(h.service.view(view.id).unwrap().step, CheckoutStep::Details);
        let skip = h.service.submit_customization(view.id, None).await;
        assert!(matches!(skip, Err(ServiceError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn analysis_failure_still_reaches_customization() {
        let h = harness();
        let cart_id = h.carts.create();
        h.carts.add_item(cart_id, line("Rapid Prototype", Some(dec!(950)))).unwrap();
        let view = h.service.start(cart_id, None).await.unwrap();

        let view = h.service.submit_details(view.id, details(true), None).await.unwrap();
        assert_eq!(view.step, CheckoutStep::Customization);
        assert!(view.analysis.is_none());
    }

    #[tokio::test]
    async fn guest_without_account_creation_fails_before_any_adapter_call() {
        let h = harness();
        let cart_id = h.carts.create();
        h.carts.add_item(cart_id, line("Rapid Prototype", Some(dec!(950)))).unwrap();
        let view = h.service.start(cart_id, None).await.unwrap();

        h.service.submit_details(view.id, details(false), None).await.unwrap();
        h.service.submit_customization(view.id, None).await.unwrap();

        let result = h.service.submit_payment(view.id, PaymentMethod::Card, None).await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
        assert_eq!(h.identity.registers.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 0);
        assert_eq!(h.gateway.sessions.load(Ordering::SeqCst), 0);

        // The failure is user-correctable: the wizard stays on Payment.
        assert_eq!(h.service.view(view.id).unwrap().step, CheckoutStep::Payment);
    }

    #[tokio::test]
    async fn invoice_offered_strictly_above_threshold() {
        assert_eq!(
            offered_methods(&[line("A", Some(dec!(2000)))]),
            vec![PaymentMethod::Card]
        );
        assert_eq!(
            offered_methods(&[line("A", Some(dec!(2001)))]),
            vec![PaymentMethod::Card, PaymentMethod::Invoice]
        );
    }

    #[tokio::test]
    async fn custom_line_opens_invoice_path_at_any_total() {
        let items = [line("A", Some(dec!(1))), line("B", None)];
        assert!(offered_methods(&items).contains(&PaymentMethod::Invoice));
    }

    #[tokio::test]
    async fn invoice_method_rejected_when_not_offered() {
        let h = harness();
        let cart_id = h.carts.create();
        h.carts.add_item(cart_id, line("Rapid Prototype", Some(dec!(950)))).unwrap();
        let view = h.service.start(cart_id, None).await.unwrap();
        h.service.submit_details(view.id, details(true), None).await.unwrap();
        h.service.submit_customization(view.id, None).await.unwrap();

        let result = h.service.submit_payment(view.id, PaymentMethod::Invoice, None).await;
        assert!(matches!(result, Err(ServiceError::InvalidOperation(_))));
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn back_navigation_walks_one_step() {
        let h = harness();
        let cart_id = h.carts.create();
        h.carts.add_item(cart_id, line("Rapid Prototype", Some(dec!(950)))).unwrap();
        let view = h.service.start(cart_id, None).await.unwrap();
        h.service.submit_details(view.id, details(true), None).await.unwrap();

        let view = h.service.go_back(view.id).unwrap();
        assert_eq!(view.step, CheckoutStep::Details);
        assert!(h.service.go_back(view.id).is_err());
    }

    #[tokio::test]
    async fn idle_wizards_are_swept_after_the_ttl() {
        let h = harness();
        let cart_id = h.carts.create();
        h.carts.add_item(cart_id, line("Rapid Prototype", Some(dec!(950)))).unwrap();
        let view = h.service.start(cart_id, None).await.unwrap();

        // Fresh sessions survive a sweep with a generous TTL.
        assert_eq!(h.service.sweep(Duration::from_secs(3600)), 0);
        assert!(h.service.view(view.id).is_ok());

        // A zero TTL treats every idle session as expired.
        assert_eq!(h.service.sweep(Duration::ZERO), 1);
        assert!(matches!(
            h.service.view(view.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn suggestion_merge_overwrites_existing_values() {
        let mut configurations = Configurations::new();
        configurations
            .entry(0)
            .or_default()
            .insert("aesthetic".to_string(), "Luxury & Serif".to_string());

        let mut values = BTreeMap::new();
        values.insert("aesthetic".to_string(), "Minimal & Clean".to_string());
        apply_suggestions(
            &mut configurations,
            vec![ConfigSuggestion {
                item_index: 0,
                values,
            }],
        );

        assert_eq!(configurations[&0]["aesthetic"], "Minimal & Clean");
    }

    #[test]
    fn unknown_configuration_keys_are_dropped() {
        let items = [line("SaaS Prototype", Some(dec!(950)))];
        let mut configurations = Configurations::new();
        let entry = configurations.entry(0).or_default();
        entry.insert("database".to_string(), "MySQL".to_string());
        entry.insert("made_up".to_string(), "nope".to_string());

        let clean = sanitize_configurations(&items, configurations);
        assert!(clean[&0].contains_key("database"));
        assert!(!clean[&0].contains_key("made_up"));
    }
}
