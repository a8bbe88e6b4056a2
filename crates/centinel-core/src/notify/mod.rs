//! C6 — notification engine: viability table and recipient resolution.

pub mod recipients;
pub mod viability;

pub use recipients::{contact_is_eligible, resolve_recipients, state_bit, RecipientQuery};
pub use viability::{is_viable, NotificationCategory, Reason, ViabilityInputs};
