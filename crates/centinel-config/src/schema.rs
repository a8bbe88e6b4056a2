//! Declarative configuration schema.
//!
//! These types are the name-based, unresolved form of the object model in
//! spec.md §3. `centinel-core::object_graph::diff` is the only consumer; it
//! resolves every name reference here into a stable handle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub main: MainSection,
    #[serde(default)]
    pub timeperiod: BTreeMap<String, RawTimeperiod>,
    #[serde(default)]
    pub command: BTreeMap<String, RawCommand>,
    #[serde(default)]
    pub contact: BTreeMap<String, RawContact>,
    #[serde(default)]
    pub contactgroup: BTreeMap<String, RawContactgroup>,
    #[serde(default)]
    pub host: BTreeMap<String, RawHost>,
    #[serde(default)]
    pub service: BTreeMap<String, RawService>,
    #[serde(default)]
    pub host_dependency: Vec<RawDependency>,
    #[serde(default)]
    pub service_dependency: Vec<RawDependency>,
    #[serde(default)]
    pub host_escalation: Vec<RawEscalation>,
    #[serde(default)]
    pub service_escalation: Vec<RawEscalation>,
}

/// Engine-wide keys, selection per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MainSection {
    pub status_file: String,
    pub command_file: String,
    pub resource_file: String,
    pub retention_file: String,
    pub check_reaper_interval_secs: u64,
    pub command_check_interval_secs: u64,
    pub host_freshness_check_interval_secs: u64,
    pub service_freshness_check_interval_secs: u64,
    pub auto_rescheduling_interval_secs: u64,
    pub retention_update_interval_secs: u64,
    pub status_update_interval_secs: u64,
    pub max_parallel_service_checks: usize,
    pub max_host_check_spread: u32,
    pub max_service_check_spread: u32,
    pub interval_length_secs: u64,
    pub service_inter_check_delay_method: InterCheckDelayMethod,
    pub service_interleave_factor_method: InterleaveFactorMethod,
    pub host_inter_check_delay_method: InterCheckDelayMethod,
    pub enable_notifications: bool,
    pub enable_flap_detection: bool,
    pub enable_event_handlers: bool,
    pub check_external_commands: bool,
    pub accept_passive_host_checks: bool,
    pub accept_passive_service_checks: bool,
    pub use_aggressive_host_checking: bool,
    pub low_host_flap_threshold: f64,
    pub high_host_flap_threshold: f64,
    pub low_service_flap_threshold: f64,
    pub high_service_flap_threshold: f64,
    pub illegal_object_chars: String,
    pub illegal_macro_output_chars: String,
    pub external_command_buffer_slots: usize,
}

impl Default for MainSection {
    fn default() -> Self {
        Self {
            status_file: "/var/lib/centinel/status.dat".into(),
            command_file: "/var/lib/centinel/centinel.cmd".into(),
            resource_file: "/etc/centinel/resource.cfg".into(),
            retention_file: "/var/lib/centinel/retention.dat".into(),
            check_reaper_interval_secs: 10,
            command_check_interval_secs: 1,
            host_freshness_check_interval_secs: 60,
            service_freshness_check_interval_secs: 60,
            auto_rescheduling_interval_secs: 30,
            retention_update_interval_secs: 60,
            status_update_interval_secs: 15,
            max_parallel_service_checks: 0,
            max_host_check_spread: 30,
            max_service_check_spread: 30,
            interval_length_secs: 60,
            service_inter_check_delay_method: InterCheckDelayMethod::Smart,
            service_interleave_factor_method: InterleaveFactorMethod::Smart,
            host_inter_check_delay_method: InterCheckDelayMethod::Smart,
            enable_notifications: true,
            enable_flap_detection: true,
            enable_event_handlers: true,
            check_external_commands: true,
            accept_passive_host_checks: true,
            accept_passive_service_checks: true,
            use_aggressive_host_checking: false,
            low_host_flap_threshold: 25.0,
            high_host_flap_threshold: 50.0,
            low_service_flap_threshold: 25.0,
            high_service_flap_threshold: 50.0,
            illegal_object_chars: "`~!$%^&*|'\"<>?,()=".into(),
            illegal_macro_output_chars: "`~$&|'\"<>".into(),
            external_command_buffer_slots: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterCheckDelayMethod {
    None,
    Dumb,
    User,
    Smart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterleaveFactorMethod {
    User,
    Smart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDateRange {
    /// e.g. "monday", "day 1", "january 1"
    pub range: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTimeperiod {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub ranges: Vec<RawDateRange>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCommand {
    pub line: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContact {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub pager: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub host_notification_commands: Vec<String>,
    #[serde(default)]
    pub service_notification_commands: Vec<String>,
    #[serde(default)]
    pub host_notification_period: String,
    #[serde(default)]
    pub service_notification_period: String,
    #[serde(default)]
    pub host_notification_options: Vec<String>,
    #[serde(default)]
    pub service_notification_options: Vec<String>,
    #[serde(default = "default_true")]
    pub can_submit_commands: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContactgroup {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawHost {
    #[serde(default)]
    pub alias: String,
    pub address: String,
    #[serde(default)]
    pub check_command: Option<String>,
    pub check_period: String,
    #[serde(default = "default_interval")]
    pub check_interval_min: f64,
    #[serde(default = "default_interval")]
    pub retry_interval_min: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub event_handler: Option<String>,
    #[serde(default)]
    pub notification_period: String,
    #[serde(default = "default_interval")]
    pub notification_interval_min: f64,
    #[serde(default)]
    pub first_notification_delay_min: f64,
    #[serde(default)]
    pub recovery_notification_delay_min: f64,
    #[serde(default = "default_low_flap")]
    pub low_flap_threshold: f64,
    #[serde(default = "default_high_flap")]
    pub high_flap_threshold: f64,
    #[serde(default)]
    pub freshness_threshold_secs: u64,
    #[serde(default = "default_true")]
    pub process_perfdata: bool,
    #[serde(default)]
    pub notification_options: Vec<String>,
    #[serde(default)]
    pub stalking_options: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub contact_groups: Vec<String>,
    #[serde(default = "default_true")]
    pub checks_enabled: bool,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawService {
    #[serde(default)]
    pub alias: String,
    pub host: String,
    pub description: String,
    pub check_command: String,
    pub check_period: String,
    #[serde(default = "default_interval")]
    pub check_interval_min: f64,
    #[serde(default = "default_interval")]
    pub retry_interval_min: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub event_handler: Option<String>,
    #[serde(default)]
    pub notification_period: String,
    #[serde(default = "default_interval")]
    pub notification_interval_min: f64,
    #[serde(default)]
    pub first_notification_delay_min: f64,
    #[serde(default)]
    pub recovery_notification_delay_min: f64,
    #[serde(default = "default_low_flap")]
    pub low_flap_threshold: f64,
    #[serde(default = "default_high_flap")]
    pub high_flap_threshold: f64,
    #[serde(default)]
    pub freshness_threshold_secs: u64,
    #[serde(default = "default_true")]
    pub process_perfdata: bool,
    #[serde(default)]
    pub notification_options: Vec<String>,
    #[serde(default)]
    pub stalking_options: Vec<String>,
    #[serde(default)]
    pub is_volatile: bool,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub contact_groups: Vec<String>,
    #[serde(default = "default_true")]
    pub checks_enabled: bool,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_interval() -> f64 {
    5.0
}
fn default_max_attempts() -> u32 {
    3
}
fn default_low_flap() -> f64 {
    25.0
}
fn default_high_flap() -> f64 {
    50.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Execution,
    Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDependency {
    pub master_host: String,
    #[serde(default)]
    pub master_service: Option<String>,
    pub dependent_host: String,
    #[serde(default)]
    pub dependent_service: Option<String>,
    pub kind: DependencyKind,
    #[serde(default)]
    pub timeperiod: Option<String>,
    #[serde(default)]
    pub inherits_parent: bool,
    #[serde(default)]
    pub fail_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEscalation {
    pub host: String,
    #[serde(default)]
    pub service: Option<String>,
    pub first_notification: u32,
    pub last_notification: u32,
    pub notification_interval_min: f64,
    #[serde(default)]
    pub timeperiod: Option<String>,
    #[serde(default)]
    pub escalate_on: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub contact_groups: Vec<String>,
}
