use dashmap::DashMap;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::product::LineItem;

/// Carts idle longer than this are dropped on the next `create` call.
const CART_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory ordered list of selected product lines. No merge or quantity
/// logic: duplicates are independent lines, removable by position.
#[derive(Debug, Clone)]
pub struct Cart {
    items: Vec<LineItem>,
    touched_at: Instant,
}

impl Default for Cart {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            touched_at: Instant::now(),
        }
    }
}

impl Cart {
    pub fn add(&mut self, item: LineItem) {
        self.items.push(item);
    }

    /// Removes the line at `index`; remaining lines re-index.
    pub fn remove_at(&mut self, index: usize) -> Result<LineItem, ServiceError> {
        if index >= self.items.len() {
            return Err(ServiceError::ValidationError(format!(
                "no cart line at position {index}"
            )));
        }
        Ok(self.items.remove(index))
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of numeric prices; missing/"Custom" prices count as zero.
    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::amount).sum()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Registry of live carts keyed by cart id. Carts are owned here; the
/// checkout orchestrator touches them only through remove-line passthrough
/// and clear-on-success.
#[derive(Debug, Default)]
pub struct CartRegistry {
    carts: DashMap<Uuid, Cart>,
}

impl CartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self))]
    pub fn create(&self) -> Uuid {
        self.sweep(CART_IDLE_TTL);
        let id = Uuid::new_v4();
        self.carts.insert(id, Cart::default());
        id
    }

    /// Drops carts idle longer than `idle_for`. Returns the number removed.
    pub fn sweep(&self, idle_for: Duration) -> usize {
        let before = self.carts.len();
        self.carts.retain(|_, cart| cart.touched_at.elapsed() <= idle_for);
        before - self.carts.len()
    }

    pub fn add_item(&self, cart_id: Uuid, item: LineItem) -> Result<usize, ServiceError> {
        let mut cart = self.get_mut(cart_id)?;
        cart.add(item);
        Ok(cart.len())
    }

    pub fn remove_item(&self, cart_id: Uuid, index: usize) -> Result<LineItem, ServiceError> {
        self.get_mut(cart_id)?.remove_at(index)
    }

    pub fn items(&self, cart_id: Uuid) -> Result<Vec<LineItem>, ServiceError> {
        Ok(self.get(cart_id)?.items().to_vec())
    }

    pub fn total(&self, cart_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(self.get(cart_id)?.total())
    }

    pub fn clear(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        self.get_mut(cart_id)?.clear();
        Ok(())
    }

    fn get(&self, cart_id: Uuid) -> Result<dashmap::mapref::one::Ref<'_, Uuid, Cart>, ServiceError> {
        self.carts
            .get(&cart_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {cart_id} not found")))
    }

    fn get_mut(
        &self,
        cart_id: Uuid,
    ) -> Result<dashmap::mapref::one::RefMut<'_, Uuid, Cart>, ServiceError> {
        let mut cart = self
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {cart_id} not found")))?;
        cart.touched_at = Instant::now();
        Ok(cart)
    }
}
