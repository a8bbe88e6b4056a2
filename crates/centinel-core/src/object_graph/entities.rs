//! Entity definitions (spec.md §3).
//!
//! Static (config-derived) fields and runtime (state-machine-owned) fields
//! are split into separate structs per entity so that "the notification
//! engine reads but does not write operational state" (spec.md §3) is
//! enforced structurally: `NotificationState` is the one runtime sub-struct
//! C6 is allowed to mutate.

use crate::handle::*;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Up,
    Down,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Ok,
    Warning,
    Unknown,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateType {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcknowledgementType {
    #[default]
    None,
    Normal,
    Sticky,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostNotificationMask: u8 {
        const DOWN        = 0b0000_0001;
        const UNREACHABLE = 0b0000_0010;
        const RECOVERY    = 0b0000_0100;
        const FLAPPING    = 0b0000_1000;
        const DOWNTIME    = 0b0001_0000;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ServiceNotificationMask: u8 {
        const WARNING     = 0b0000_0001;
        const UNKNOWN     = 0b0000_0010;
        const CRITICAL    = 0b0000_0100;
        const RECOVERY    = 0b0000_1000;
        const FLAPPING    = 0b0001_0000;
        const DOWNTIME    = 0b0010_0000;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StalkingMask: u8 {
        const OK_UP    = 0b0000_0001;
        const WARNING  = 0b0000_0010;
        const UNKNOWN  = 0b0000_0100;
        const CRITICAL_DOWN = 0b0000_1000;
    }
}

/// Fixed-length ring of recent states used by flap detection (spec.md
/// §4.5). `N = 21` is a compile-time constant per spec.md §9's deferral of
/// making it configurable.
pub const FLAP_RING_LEN: usize = 21;

#[derive(Debug, Clone)]
pub struct FlapRing {
    pub entries: Vec<u8>,
    pub is_flapping: bool,
    pub percent_state_change: f64,
}

impl Default for FlapRing {
    fn default() -> Self {
        Self {
            entries: Vec::with_capacity(FLAP_RING_LEN),
            is_flapping: false,
            percent_state_change: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    pub notification_number: u32,
    pub last_notification: Option<DateTime<Utc>>,
    pub next_notification: Option<DateTime<Utc>>,
    pub notified_on: u8,
}

#[derive(Debug, Clone)]
pub struct CheckableRuntime {
    pub current_attempt: u32,
    pub state_type: StateType,
    pub current_event_id: u64,
    pub last_event_id: u64,
    pub current_problem_id: u64,
    pub last_problem_id: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    pub last_state_change: Option<DateTime<Utc>>,
    pub last_hard_state_change: Option<DateTime<Utc>>,
    pub plugin_output: String,
    pub long_output: String,
    pub perfdata: String,
    pub latency_secs: f64,
    pub execution_time_secs: f64,
    pub acknowledgement: AcknowledgementType,
    pub ack_expire_time: Option<DateTime<Utc>>,
    pub scheduled_downtime_depth: u32,
    pub flap: FlapRing,
    pub pending_flex_downtime: bool,
    pub notification: NotificationState,
    pub should_be_scheduled: bool,
    pub checks_enabled: bool,
    pub notifications_enabled: bool,
}

impl Default for CheckableRuntime {
    fn default() -> Self {
        Self {
            current_attempt: 1,
            state_type: StateType::Hard,
            current_event_id: 0,
            last_event_id: 0,
            current_problem_id: 0,
            last_problem_id: 0,
            last_check: None,
            next_check: None,
            last_state_change: None,
            last_hard_state_change: None,
            plugin_output: String::new(),
            long_output: String::new(),
            perfdata: String::new(),
            latency_secs: 0.0,
            execution_time_secs: 0.0,
            acknowledgement: AcknowledgementType::None,
            ack_expire_time: None,
            scheduled_downtime_depth: 0,
            flap: FlapRing::default(),
            pending_flex_downtime: false,
            notification: NotificationState::default(),
            should_be_scheduled: true,
            checks_enabled: true,
            notifications_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Host {
    pub name: String,
    pub alias: String,
    pub address: String,
    pub check_command: Option<CommandHandle>,
    pub check_interval_secs: f64,
    pub retry_interval_secs: f64,
    pub max_attempts: u32,
    pub check_period: TimeperiodHandle,
    pub event_handler: Option<CommandHandle>,
    pub notification_period: TimeperiodHandle,
    pub notification_interval_secs: f64,
    pub first_notification_delay_secs: f64,
    pub recovery_notification_delay_secs: f64,
    pub low_flap_threshold: f64,
    pub high_flap_threshold: f64,
    pub freshness_threshold_secs: u64,
    pub process_perfdata: bool,
    pub notification_options: HostNotificationMask,
    pub stalking_options: StalkingMask,
    pub parents: HashSet<HostHandle>,
    pub children: HashSet<HostHandle>,
    pub contacts: HashSet<ContactHandle>,
    pub contact_groups: HashSet<ContactgroupHandle>,
    pub escalations: HashSet<EscalationHandle>,
    pub services: HashSet<ServiceHandle>,

    pub current_state: HostState,
    pub last_state: HostState,
    pub last_hard_state: HostState,
    pub runtime: CheckableRuntime,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub host: HostHandle,
    pub description: String,
    pub alias: String,
    pub check_command: CommandHandle,
    pub check_interval_secs: f64,
    pub retry_interval_secs: f64,
    pub max_attempts: u32,
    pub check_period: TimeperiodHandle,
    pub event_handler: Option<CommandHandle>,
    pub notification_period: TimeperiodHandle,
    pub notification_interval_secs: f64,
    pub first_notification_delay_secs: f64,
    pub recovery_notification_delay_secs: f64,
    pub low_flap_threshold: f64,
    pub high_flap_threshold: f64,
    pub freshness_threshold_secs: u64,
    pub process_perfdata: bool,
    pub notification_options: ServiceNotificationMask,
    pub stalking_options: StalkingMask,
    pub is_volatile: bool,
    pub contacts: HashSet<ContactHandle>,
    pub contact_groups: HashSet<ContactgroupHandle>,
    pub escalations: HashSet<EscalationHandle>,

    pub current_state: ServiceState,
    pub last_state: ServiceState,
    pub last_hard_state: ServiceState,
    pub runtime: CheckableRuntime,
}

#[derive(Debug, Clone, Default)]
pub struct Contact {
    pub name: String,
    pub alias: String,
    pub email: String,
    pub pager: String,
    pub addresses: Vec<String>,
    pub host_notification_commands: Vec<CommandHandle>,
    pub service_notification_commands: Vec<CommandHandle>,
    pub host_notification_period: Option<TimeperiodHandle>,
    pub service_notification_period: Option<TimeperiodHandle>,
    pub host_notification_options: HostNotificationMask,
    pub service_notification_options: ServiceNotificationMask,
    pub can_submit_commands: bool,
    pub contactgroups: HashSet<ContactgroupHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct Contactgroup {
    pub name: String,
    pub alias: String,
    pub members: HashSet<ContactHandle>,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Execution,
    Notification,
}

#[derive(Debug, Clone, Copy)]
pub enum DependencyEntity {
    Host(HostHandle),
    Service(ServiceHandle),
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub master: DependencyEntity,
    pub dependent: DependencyEntity,
    pub kind: DependencyKind,
    pub timeperiod: Option<TimeperiodHandle>,
    pub inherits_parent: bool,
    /// Bitmask over master states that cause this dependency to fail;
    /// interpreted against `HostState`/`ServiceState` depending on
    /// `master`'s variant.
    pub fail_on: u8,
}

#[derive(Debug, Clone)]
pub struct Escalation {
    pub entity: DependencyEntity,
    pub first_notification: u32,
    pub last_notification: u32,
    pub notification_interval_secs: f64,
    pub timeperiod: Option<TimeperiodHandle>,
    pub escalate_on: u8,
    pub contacts: HashSet<ContactHandle>,
    pub contact_groups: HashSet<ContactgroupHandle>,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: u64,
    pub entity: EntityHandle,
    pub author: String,
    pub text: String,
    pub persistent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowntimeKind {
    Fixed,
    Flexible,
}

#[derive(Debug, Clone)]
pub struct Downtime {
    pub id: u64,
    pub entity: EntityHandle,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: DowntimeKind,
    pub duration_secs: u64,
    pub trigger_id: Option<u64>,
    pub is_in_effect: bool,
}

impl Host {
    pub fn ok_state(&self) -> HostState {
        HostState::Up
    }
}

impl Service {
    pub fn ok_state(&self) -> ServiceState {
        ServiceState::Ok
    }
}
