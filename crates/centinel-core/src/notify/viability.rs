//! C6 viability table (spec.md §4.6). The first failing check aborts the
//! notification; `FORCED` bypasses every check except entity existence,
//! which is enforced by the caller holding a valid handle in the first
//! place.

use crate::object_graph::{AcknowledgementType, CheckableRuntime};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Normal,
    Recovery,
    Acknowledgement,
    Flapping,
    Downtime,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Normal,
    Recovery,
    Acknowledgement,
    FlappingStart,
    FlappingStop,
    FlappingDisabled,
    DowntimeStart,
    DowntimeEnd,
    DowntimeCancelled,
    Custom,
}

impl Reason {
    pub fn category(self) -> NotificationCategory {
        match self {
            Reason::Normal => NotificationCategory::Normal,
            Reason::Recovery => NotificationCategory::Recovery,
            Reason::Acknowledgement => NotificationCategory::Acknowledgement,
            Reason::FlappingStart | Reason::FlappingStop | Reason::FlappingDisabled => {
                NotificationCategory::Flapping
            }
            Reason::DowntimeStart | Reason::DowntimeEnd | Reason::DowntimeCancelled => {
                NotificationCategory::Downtime
            }
            Reason::Custom => NotificationCategory::Custom,
        }
    }
}

/// Everything the viability table needs that isn't already on
/// [`CheckableRuntime`]; kept as a struct of borrowed scalars rather than a
/// trait object so callers for hosts and services can build it from their
/// own entity without an extra abstraction layer.
pub struct ViabilityInputs<'a> {
    pub global_notifications_enabled: bool,
    pub entity_notifications_enabled: bool,
    pub notification_period_valid_now: bool,
    pub is_in_downtime: bool,
    pub is_flapping: bool,
    pub is_ok_state: bool,
    pub notify_on_current_state: bool,
    pub notify_on_flapping: bool,
    pub notify_on_downtime: bool,
    pub first_notification_delay_secs: f64,
    pub recovery_notification_delay_secs: f64,
    pub notification_interval_secs: f64,
    pub now: DateTime<Utc>,
    pub runtime: &'a CheckableRuntime,
    pub forced: bool,
}

fn delay_elapsed(anchor: Option<DateTime<Utc>>, delay_secs: f64, now: DateTime<Utc>) -> bool {
    match anchor {
        Some(t) => now >= t + chrono::Duration::milliseconds((delay_secs * 1000.0) as i64),
        None => true,
    }
}

/// Returns `true` if a notification of `reason` should be sent, given
/// `inputs`. `FORCED` short-circuits straight to `true`.
pub fn is_viable(reason: Reason, inputs: &ViabilityInputs) -> bool {
    if inputs.forced {
        return true;
    }
    match reason.category() {
        NotificationCategory::Normal => viable_normal(inputs, false),
        NotificationCategory::Recovery => inputs.is_ok_state && viable_normal(inputs, true),
        NotificationCategory::Acknowledgement => {
            inputs.global_notifications_enabled && !inputs.is_ok_state
        }
        NotificationCategory::Flapping => {
            inputs.global_notifications_enabled && inputs.notify_on_flapping && !inputs.is_in_downtime
        }
        NotificationCategory::Downtime => {
            inputs.global_notifications_enabled
                && inputs.notify_on_downtime
                && inputs.runtime.scheduled_downtime_depth == 0
        }
        NotificationCategory::Custom => inputs.global_notifications_enabled && !inputs.is_in_downtime,
    }
}

fn viable_normal(inputs: &ViabilityInputs, is_recovery: bool) -> bool {
    if !inputs.global_notifications_enabled || !inputs.entity_notifications_enabled {
        return false;
    }
    if !inputs.notification_period_valid_now {
        return false;
    }
    if inputs.is_in_downtime || inputs.is_flapping {
        return false;
    }
    if inputs.runtime.state_type != crate::object_graph::StateType::Hard {
        return false;
    }
    if inputs.runtime.acknowledgement != AcknowledgementType::None {
        return false;
    }
    if !inputs.notify_on_current_state {
        return false;
    }
    if inputs.runtime.notification.notification_number == 0 {
        if !delay_elapsed(
            inputs.runtime.last_hard_state_change,
            inputs.first_notification_delay_secs,
            inputs.now,
        ) {
            return false;
        }
    } else if let Some(last) = inputs.runtime.notification.last_notification {
        if inputs.now < last + chrono::Duration::milliseconds((inputs.notification_interval_secs * 1000.0) as i64) {
            return false;
        }
    }
    if is_recovery
        && !delay_elapsed(
            inputs.runtime.last_hard_state_change,
            inputs.recovery_notification_delay_secs,
            inputs.now,
        )
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_graph::{CheckableRuntime, StateType};
    use chrono::TimeZone;

    fn base_runtime() -> CheckableRuntime {
        let mut rt = CheckableRuntime::default();
        rt.state_type = StateType::Hard;
        rt
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn forced_bypasses_every_check() {
        let rt = base_runtime();
        let inputs = ViabilityInputs {
            global_notifications_enabled: false,
            entity_notifications_enabled: false,
            notification_period_valid_now: false,
            is_in_downtime: true,
            is_flapping: true,
            is_ok_state: false,
            notify_on_current_state: false,
            notify_on_flapping: false,
            notify_on_downtime: false,
            first_notification_delay_secs: 0.0,
            recovery_notification_delay_secs: 0.0,
            notification_interval_secs: 0.0,
            now: now(),
            runtime: &rt,
            forced: true,
        };
        assert!(is_viable(Reason::Normal, &inputs));
    }

    #[test]
    fn normal_denied_when_in_downtime() {
        let rt = base_runtime();
        let inputs = ViabilityInputs {
            global_notifications_enabled: true,
            entity_notifications_enabled: true,
            notification_period_valid_now: true,
            is_in_downtime: true,
            is_flapping: false,
            is_ok_state: false,
            notify_on_current_state: true,
            notify_on_flapping: true,
            notify_on_downtime: true,
            first_notification_delay_secs: 0.0,
            recovery_notification_delay_secs: 0.0,
            notification_interval_secs: 0.0,
            now: now(),
            runtime: &rt,
            forced: false,
        };
        assert!(!is_viable(Reason::Normal, &inputs));
    }

    #[test]
    fn first_notification_waits_for_delay() {
        let mut rt = base_runtime();
        rt.last_hard_state_change = Some(now());
        let inputs = ViabilityInputs {
            global_notifications_enabled: true,
            entity_notifications_enabled: true,
            notification_period_valid_now: true,
            is_in_downtime: false,
            is_flapping: false,
            is_ok_state: false,
            notify_on_current_state: true,
            notify_on_flapping: true,
            notify_on_downtime: true,
            first_notification_delay_secs: 300.0,
            recovery_notification_delay_secs: 0.0,
            notification_interval_secs: 0.0,
            now: now(),
            runtime: &rt,
            forced: false,
        };
        assert!(!is_viable(Reason::Normal, &inputs));
    }

    #[test]
    fn downtime_category_requires_zero_depth() {
        let mut rt = base_runtime();
        rt.scheduled_downtime_depth = 1;
        let inputs = ViabilityInputs {
            global_notifications_enabled: true,
            entity_notifications_enabled: true,
            notification_period_valid_now: true,
            is_in_downtime: false,
            is_flapping: false,
            is_ok_state: false,
            notify_on_current_state: true,
            notify_on_flapping: true,
            notify_on_downtime: true,
            first_notification_delay_secs: 0.0,
            recovery_notification_delay_secs: 0.0,
            notification_interval_secs: 0.0,
            now: now(),
            runtime: &rt,
            forced: false,
        };
        assert!(!is_viable(Reason::DowntimeStart, &inputs));
    }
}
