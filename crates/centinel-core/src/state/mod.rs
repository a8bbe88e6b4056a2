//! C5 — per-entity state machine and flap detection.

pub mod flap;
pub mod machine;

pub use flap::FlapTransition;
pub use machine::{
    apply_transition, coerce_active_host_state, coerce_service_state, parse_plugin_output, ActiveOrPassive,
    CheckResult, NotificationReason, ParsedOutput, TransitionOutcome,
};
