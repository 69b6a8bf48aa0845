pub mod advisory;
pub mod cart;
pub mod checkout;
pub mod identity;
pub mod orders;
pub mod payments;
pub mod reconciler;
