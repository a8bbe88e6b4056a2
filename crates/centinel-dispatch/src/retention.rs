//! Retention file (spec.md §4.7 step 6, §6 "Retention file").
//!
//! Same textual block shape as the status file. Read once at startup (if
//! enabled) and merged into the freshly built `ObjectGraph`; written on
//! shutdown and at the configured retention-update interval. Merging only
//! carries runtime state across for entities that exist in both the old and
//! the new generation — an entity dropped from config loses its history, one
//! newly added starts from `CheckableRuntime::default()`.

use centinel_core::object_graph::{AcknowledgementType, HostState, ObjectGraph, ServiceState, StateType};
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;

use crate::error::PersistenceError;
use crate::status_file::{parse_blocks, write_blocks, Block};

fn epoch(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(|d| d.timestamp())
}

fn from_epoch(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

fn get_u32(block: &Block, key: &str) -> u32 {
    block.fields.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}
fn get_u64(block: &Block, key: &str) -> u64 {
    block.fields.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}
fn get_i32(block: &Block, key: &str) -> i32 {
    block.fields.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}
fn get_i64(block: &Block, key: &str) -> Option<i64> {
    block.fields.get(key).and_then(|v| v.parse().ok())
}
fn get_bool(block: &Block, key: &str, default: bool) -> bool {
    block.fields.get(key).map(|v| v == "1").unwrap_or(default)
}

fn host_state_num(s: HostState) -> i32 {
    match s {
        HostState::Up => 0,
        HostState::Down => 1,
        HostState::Unreachable => 2,
    }
}
fn host_state_from_num(n: i32) -> HostState {
    match n {
        1 => HostState::Down,
        2 => HostState::Unreachable,
        _ => HostState::Up,
    }
}
fn service_state_num(s: ServiceState) -> i32 {
    match s {
        ServiceState::Ok => 0,
        ServiceState::Warning => 1,
        ServiceState::Critical => 2,
        ServiceState::Unknown => 3,
    }
}
fn service_state_from_num(n: i32) -> ServiceState {
    match n {
        1 => ServiceState::Warning,
        2 => ServiceState::Critical,
        3 => ServiceState::Unknown,
        _ => ServiceState::Ok,
    }
}
fn ack_num(a: AcknowledgementType) -> u8 {
    match a {
        AcknowledgementType::None => 0,
        AcknowledgementType::Normal => 1,
        AcknowledgementType::Sticky => 2,
    }
}
fn ack_from_num(n: u8) -> AcknowledgementType {
    match n {
        1 => AcknowledgementType::Normal,
        2 => AcknowledgementType::Sticky,
        _ => AcknowledgementType::None,
    }
}

/// Serializes every host's and service's runtime state into retention
/// blocks and writes them atomically.
pub fn write_retention(path: &Path, graph: &ObjectGraph) -> Result<(), PersistenceError> {
    let mut blocks = Vec::new();
    let mut info = Block::new("info");
    info.set("generation", graph.generation.to_string());
    blocks.push(info);

    for (_, host) in graph.iter_hosts() {
        let mut block = Block::new("hoststatus");
        block.set("host_name", host.name.as_str());
        block.set("current_attempt", host.runtime.current_attempt.to_string());
        block.set(
            "state_type_hard",
            ((host.runtime.state_type == StateType::Hard) as i32).to_string(),
        );
        block.set("current_state", host_state_num(host.current_state).to_string());
        block.set("last_state", host_state_num(host.last_state).to_string());
        block.set("last_hard_state", host_state_num(host.last_hard_state).to_string());
        block.set("current_event_id", host.runtime.current_event_id.to_string());
        block.set("last_event_id", host.runtime.last_event_id.to_string());
        block.set("current_problem_id", host.runtime.current_problem_id.to_string());
        block.set("last_problem_id", host.runtime.last_problem_id.to_string());
        if let Some(e) = epoch(host.runtime.last_check) {
            block.set("last_check", e.to_string());
        }
        if let Some(e) = epoch(host.runtime.last_state_change) {
            block.set("last_state_change", e.to_string());
        }
        if let Some(e) = epoch(host.runtime.last_hard_state_change) {
            block.set("last_hard_state_change", e.to_string());
        }
        block.set("acknowledgement", ack_num(host.runtime.acknowledgement).to_string());
        block.set("scheduled_downtime_depth", host.runtime.scheduled_downtime_depth.to_string());
        block.set("notification_number", host.runtime.notification.notification_number.to_string());
        block.set("checks_enabled", (host.runtime.checks_enabled as i32).to_string());
        block.set(
            "notifications_enabled",
            (host.runtime.notifications_enabled as i32).to_string(),
        );
        blocks.push(block);
    }

    for (_, svc) in graph.iter_services() {
        let host_name = graph.host(svc.host).map(|h| h.name.as_str()).unwrap_or("");
        let mut block = Block::new("servicestatus");
        block.set("host_name", host_name);
        block.set("service_description", svc.description.as_str());
        block.set("current_attempt", svc.runtime.current_attempt.to_string());
        block.set(
            "state_type_hard",
            ((svc.runtime.state_type == StateType::Hard) as i32).to_string(),
        );
        block.set("current_state", service_state_num(svc.current_state).to_string());
        block.set("last_state", service_state_num(svc.last_state).to_string());
        block.set("last_hard_state", service_state_num(svc.last_hard_state).to_string());
        block.set("current_event_id", svc.runtime.current_event_id.to_string());
        block.set("last_event_id", svc.runtime.last_event_id.to_string());
        block.set("current_problem_id", svc.runtime.current_problem_id.to_string());
        block.set("last_problem_id", svc.runtime.last_problem_id.to_string());
        if let Some(e) = epoch(svc.runtime.last_check) {
            block.set("last_check", e.to_string());
        }
        if let Some(e) = epoch(svc.runtime.last_state_change) {
            block.set("last_state_change", e.to_string());
        }
        if let Some(e) = epoch(svc.runtime.last_hard_state_change) {
            block.set("last_hard_state_change", e.to_string());
        }
        block.set("acknowledgement", ack_num(svc.runtime.acknowledgement).to_string());
        block.set("scheduled_downtime_depth", svc.runtime.scheduled_downtime_depth.to_string());
        block.set("notification_number", svc.runtime.notification.notification_number.to_string());
        block.set("checks_enabled", (svc.runtime.checks_enabled as i32).to_string());
        block.set(
            "notifications_enabled",
            (svc.runtime.notifications_enabled as i32).to_string(),
        );
        blocks.push(block);
    }

    write_blocks(path, &blocks)
}

/// Reads a retention file and applies matching hosts/services' runtime
/// state into `graph`. Blocks whose name no longer resolves in `graph` are
/// silently skipped (spec.md §4.7 step 6).
pub fn load_and_merge(path: &Path, graph: &mut ObjectGraph) -> Result<(), PersistenceError> {
    let contents = std::fs::read_to_string(path).map_err(|e| PersistenceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let blocks = parse_blocks(&contents);

    for block in blocks {
        match block.header.as_str() {
            "hoststatus" => {
                let Some(name) = block.fields.get("host_name") else { continue };
                let Some(handle) = graph.find_host(name) else { continue };
                let Some(host) = graph.host_mut(handle) else { continue };
                host.runtime.current_attempt = get_u32(&block, "current_attempt").max(1);
                host.runtime.state_type = if get_bool(&block, "state_type_hard", true) {
                    StateType::Hard
                } else {
                    StateType::Soft
                };
                host.current_state = host_state_from_num(get_i32(&block, "current_state"));
                host.last_state = host_state_from_num(get_i32(&block, "last_state"));
                host.last_hard_state = host_state_from_num(get_i32(&block, "last_hard_state"));
                host.runtime.current_event_id = get_u64(&block, "current_event_id");
                host.runtime.last_event_id = get_u64(&block, "last_event_id");
                host.runtime.current_problem_id = get_u64(&block, "current_problem_id");
                host.runtime.last_problem_id = get_u64(&block, "last_problem_id");
                host.runtime.last_check = from_epoch(get_i64(&block, "last_check"));
                host.runtime.last_state_change = from_epoch(get_i64(&block, "last_state_change"));
                host.runtime.last_hard_state_change =
                    from_epoch(get_i64(&block, "last_hard_state_change"));
                host.runtime.acknowledgement = ack_from_num(get_u32(&block, "acknowledgement") as u8);
                host.runtime.scheduled_downtime_depth = get_u32(&block, "scheduled_downtime_depth");
                host.runtime.notification.notification_number =
                    get_u32(&block, "notification_number");
                host.runtime.checks_enabled = get_bool(&block, "checks_enabled", true);
                host.runtime.notifications_enabled = get_bool(&block, "notifications_enabled", true);
            }
            "servicestatus" => {
                let (Some(host_name), Some(desc)) = (
                    block.fields.get("host_name"),
                    block.fields.get("service_description"),
                ) else {
                    continue;
                };
                let Some(handle) = graph.find_service(host_name, desc) else { continue };
                let Some(svc) = graph.service_mut(handle) else { continue };
                svc.runtime.current_attempt = get_u32(&block, "current_attempt").max(1);
                svc.runtime.state_type = if get_bool(&block, "state_type_hard", true) {
                    StateType::Hard
                } else {
                    StateType::Soft
                };
                svc.current_state = service_state_from_num(get_i32(&block, "current_state"));
                svc.last_state = service_state_from_num(get_i32(&block, "last_state"));
                svc.last_hard_state = service_state_from_num(get_i32(&block, "last_hard_state"));
                svc.runtime.current_event_id = get_u64(&block, "current_event_id");
                svc.runtime.last_event_id = get_u64(&block, "last_event_id");
                svc.runtime.current_problem_id = get_u64(&block, "current_problem_id");
                svc.runtime.last_problem_id = get_u64(&block, "last_problem_id");
                svc.runtime.last_check = from_epoch(get_i64(&block, "last_check"));
                svc.runtime.last_state_change = from_epoch(get_i64(&block, "last_state_change"));
                svc.runtime.last_hard_state_change =
                    from_epoch(get_i64(&block, "last_hard_state_change"));
                svc.runtime.acknowledgement = ack_from_num(get_u32(&block, "acknowledgement") as u8);
                svc.runtime.scheduled_downtime_depth = get_u32(&block, "scheduled_downtime_depth");
                svc.runtime.notification.notification_number =
                    get_u32(&block, "notification_number");
                svc.runtime.checks_enabled = get_bool(&block, "checks_enabled", true);
                svc.runtime.notifications_enabled = get_bool(&block, "notifications_enabled", true);
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use centinel_core::object_graph::apply_config;
    use centinel_config::schema::RawConfig;

    fn sample_config() -> RawConfig {
        let toml = r#"
            [timeperiod.always]
            alias = "Always"

            [command.check_ping]
            line = "/bin/true"

            [host.web1]
            address = "127.0.0.1"
            check_command = "check_ping"
            check_period = "always"
            notification_period = "always"
        "#;
        toml::from_str(toml).expect("sample config parses")
    }

    #[test]
    fn merge_is_skipped_for_hosts_absent_from_new_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retention.dat");

        let raw = sample_config();
        let (mut graph, _) = apply_config(None, &raw).unwrap();
        graph
            .host_mut(graph.find_host("web1").unwrap())
            .unwrap()
            .runtime
            .current_attempt = 2;
        write_retention(&path, &graph).unwrap();

        let raw_without_host = RawConfig::default();
        let (mut fresh, _) = apply_config(None, &raw_without_host).unwrap();
        assert!(load_and_merge(&path, &mut fresh).is_ok());
        assert_eq!(fresh.host_count(), 0);
    }

    #[test]
    fn merge_restores_current_attempt_for_matching_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retention.dat");

        let raw = sample_config();
        let (mut graph, _) = apply_config(None, &raw).unwrap();
        let handle = graph.find_host("web1").unwrap();
        graph.host_mut(handle).unwrap().runtime.current_attempt = 2;
        graph.host_mut(handle).unwrap().runtime.state_type = StateType::Soft;
        write_retention(&path, &graph).unwrap();

        let (mut reloaded, _) = apply_config(None, &raw).unwrap();
        load_and_merge(&path, &mut reloaded).unwrap();
        let reloaded_handle = reloaded.find_host("web1").unwrap();
        let host = reloaded.host(reloaded_handle).unwrap();
        assert_eq!(host.runtime.current_attempt, 2);
        assert_eq!(host.runtime.state_type, StateType::Soft);
    }
}
