//! C3 event queue and C4 scheduling-parameter derivation.

pub mod policy;
pub mod queue;

pub use policy::{place_hosts, place_services, derive_params, reschedule_after_failed_launch, SchedulingParams};
pub use queue::{Event, EventKind, EventQueue, NewEvent, Priority};
