//! C7 — diff applier.
//!
//! Input: a fully-parsed declarative configuration
//! (`centinel_config::RawConfig`). Output: a freshly-built [`ObjectGraph`]
//! generation plus a [`DiffResult`] describing what changed relative to the
//! previous generation (or `None` on first load).
//!
//! Failure after validation never leaves a half-applied graph: on error the
//! caller keeps using the previous `ObjectGraph` it already had; this
//! function never mutates an existing graph in place, it only ever builds a
//! brand-new one and hands it back (or returns `Err` and touches nothing).

use crate::error::{GraphError, ValidationErrors};
use crate::handle::*;
use crate::object_graph::cycle::find_cycle;
use crate::object_graph::entities::*;
use crate::object_graph::graph::ObjectGraph;
use crate::timeperiod::{DayOfWeekRange, TimeRange, Timeperiod};
use centinel_config::schema::{self as cfg, DependencyKind as RawDependencyKind, RawConfig};
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub hosts: EntityDiff,
    pub services: EntityDiff,
    pub contacts: EntityDiff,
    pub contactgroups: EntityDiff,
    pub timeperiods: EntityDiff,
    pub commands: EntityDiff,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
            && self.services.is_empty()
            && self.contacts.is_empty()
            && self.contactgroups.is_empty()
            && self.timeperiods.is_empty()
            && self.commands.is_empty()
    }
}

/// Step 3: validates names, cross-references, and scalar bounds. Returns
/// every error found rather than stopping at the first.
fn validate_raw(raw: &RawConfig) -> Vec<GraphError> {
    let mut errors = Vec::new();
    let illegal: HashSet<char> = raw.main.illegal_object_chars.chars().collect();

    let check_name = |kind: &'static str, name: &str, errors: &mut Vec<GraphError>| {
        if name.chars().any(|c| illegal.contains(&c)) {
            errors.push(GraphError::IllegalName {
                kind,
                name: name.to_string(),
            });
        }
    };

    for name in raw.timeperiod.keys() {
        check_name("timeperiod", name, &mut errors);
    }
    for name in raw.command.keys() {
        check_name("command", name, &mut errors);
    }
    for name in raw.contact.keys() {
        check_name("contact", name, &mut errors);
    }
    for name in raw.contactgroup.keys() {
        check_name("contactgroup", name, &mut errors);
    }
    for name in raw.host.keys() {
        check_name("host", name, &mut errors);
    }

    // duplicate (host, description) service keys
    let mut seen_services: HashSet<(&str, &str)> = HashSet::new();
    for svc in raw.service.values() {
        let key = (svc.host.as_str(), svc.description.as_str());
        if !seen_services.insert(key) {
            errors.push(GraphError::DuplicateName {
                kind: "service",
                name: format!("{}/{}", svc.host, svc.description),
            });
        }
    }

    for (name, tp) in &raw.timeperiod {
        for excl in &tp.exclude {
            if !raw.timeperiod.contains_key(excl) {
                errors.push(GraphError::DanglingReference {
                    kind: "timeperiod",
                    name: excl.clone(),
                    referrer: format!("timeperiod '{name}' exclude"),
                });
            }
        }
    }

    for (name, contact) in &raw.contact {
        for cmd in contact
            .host_notification_commands
            .iter()
            .chain(&contact.service_notification_commands)
        {
            if !raw.command.contains_key(cmd) {
                errors.push(GraphError::DanglingReference {
                    kind: "command",
                    name: cmd.clone(),
                    referrer: format!("contact '{name}'"),
                });
            }
        }
        for tp in [&contact.host_notification_period, &contact.service_notification_period] {
            if !tp.is_empty() && !raw.timeperiod.contains_key(tp) {
                errors.push(GraphError::DanglingReference {
                    kind: "timeperiod",
                    name: tp.clone(),
                    referrer: format!("contact '{name}'"),
                });
            }
        }
    }

    for (name, cg) in &raw.contactgroup {
        for member in &cg.members {
            if !raw.contact.contains_key(member) {
                errors.push(GraphError::DanglingReference {
                    kind: "contact",
                    name: member.clone(),
                    referrer: format!("contactgroup '{name}'"),
                });
            }
        }
    }

    for (name, host) in &raw.host {
        if let Some(cmd) = &host.check_command {
            if !raw.command.contains_key(cmd) {
                errors.push(GraphError::DanglingReference {
                    kind: "command",
                    name: cmd.clone(),
                    referrer: format!("host '{name}'"),
                });
            }
        }
        if !raw.timeperiod.contains_key(&host.check_period) {
            errors.push(GraphError::DanglingReference {
                kind: "timeperiod",
                name: host.check_period.clone(),
                referrer: format!("host '{name}' check_period"),
            });
        }
        if !host.notification_period.is_empty() && !raw.timeperiod.contains_key(&host.notification_period) {
            errors.push(GraphError::DanglingReference {
                kind: "timeperiod",
                name: host.notification_period.clone(),
                referrer: format!("host '{name}' notification_period"),
            });
        }
        for p in &host.parents {
            if !raw.host.contains_key(p) {
                errors.push(GraphError::DanglingReference {
                    kind: "host",
                    name: p.clone(),
                    referrer: format!("host '{name}' parents"),
                });
            }
        }
        for c in &host.contacts {
            if !raw.contact.contains_key(c) {
                errors.push(GraphError::DanglingReference {
                    kind: "contact",
                    name: c.clone(),
                    referrer: format!("host '{name}'"),
                });
            }
        }
        for cg in &host.contact_groups {
            if !raw.contactgroup.contains_key(cg) {
                errors.push(GraphError::DanglingReference {
                    kind: "contactgroup",
                    name: cg.clone(),
                    referrer: format!("host '{name}'"),
                });
            }
        }
        if host.max_attempts == 0 {
            errors.push(GraphError::InvalidValue {
                entity: format!("host '{name}'"),
                field: "max_attempts",
                reason: "must be > 0".into(),
            });
        }
        if host.notification_interval_min < 0.0 {
            errors.push(GraphError::InvalidValue {
                entity: format!("host '{name}'"),
                field: "notification_interval",
                reason: "must be >= 0".into(),
            });
        }
        if host.first_notification_delay_min < 0.0 {
            errors.push(GraphError::InvalidValue {
                entity: format!("host '{name}'"),
                field: "first_notification_delay",
                reason: "must be >= 0".into(),
            });
        }
    }

    for (key, svc) in &raw.service {
        let referrer = format!("service '{key}' ({}/{})", svc.host, svc.description);
        if !raw.host.contains_key(&svc.host) {
            errors.push(GraphError::DanglingReference {
                kind: "host",
                name: svc.host.clone(),
                referrer: referrer.clone(),
            });
        }
        if !raw.command.contains_key(&svc.check_command) {
            errors.push(GraphError::DanglingReference {
                kind: "command",
                name: svc.check_command.clone(),
                referrer: referrer.clone(),
            });
        }
        if !raw.timeperiod.contains_key(&svc.check_period) {
            errors.push(GraphError::DanglingReference {
                kind: "timeperiod",
                name: svc.check_period.clone(),
                referrer: referrer.clone(),
            });
        }
        if !svc.notification_period.is_empty() && !raw.timeperiod.contains_key(&svc.notification_period) {
            errors.push(GraphError::DanglingReference {
                kind: "timeperiod",
                name: svc.notification_period.clone(),
                referrer: referrer.clone(),
            });
        }
        for c in &svc.contacts {
            if !raw.contact.contains_key(c) {
                errors.push(GraphError::DanglingReference {
                    kind: "contact",
                    name: c.clone(),
                    referrer: referrer.clone(),
                });
            }
        }
        for cg in &svc.contact_groups {
            if !raw.contactgroup.contains_key(cg) {
                errors.push(GraphError::DanglingReference {
                    kind: "contactgroup",
                    name: cg.clone(),
                    referrer: referrer.clone(),
                });
            }
        }
        if svc.max_attempts == 0 {
            errors.push(GraphError::InvalidValue {
                entity: referrer.clone(),
                field: "max_attempts",
                reason: "must be > 0".into(),
            });
        }
        if svc.notification_interval_min < 0.0 {
            errors.push(GraphError::InvalidValue {
                entity: referrer.clone(),
                field: "notification_interval",
                reason: "must be >= 0".into(),
            });
        }
        if svc.first_notification_delay_min < 0.0 {
            errors.push(GraphError::InvalidValue {
                entity: referrer,
                field: "first_notification_delay",
                reason: "must be >= 0".into(),
            });
        }
    }

    for (idx, dep) in raw.host_dependency.iter().chain(&raw.service_dependency).enumerate() {
        if !raw.host.contains_key(&dep.master_host) {
            errors.push(GraphError::DanglingReference {
                kind: "host",
                name: dep.master_host.clone(),
                referrer: format!("dependency #{idx} master"),
            });
        }
        if !raw.host.contains_key(&dep.dependent_host) {
            errors.push(GraphError::DanglingReference {
                kind: "host",
                name: dep.dependent_host.clone(),
                referrer: format!("dependency #{idx} dependent"),
            });
        }
    }

    for (idx, esc) in raw.host_escalation.iter().chain(&raw.service_escalation).enumerate() {
        if !raw.host.contains_key(&esc.host) {
            errors.push(GraphError::DanglingReference {
                kind: "host",
                name: esc.host.clone(),
                referrer: format!("escalation #{idx}"),
            });
        }
        if esc.first_notification == 0 || esc.first_notification > esc.last_notification {
            errors.push(GraphError::InvalidValue {
                entity: format!("escalation #{idx}"),
                field: "first_notification",
                reason: "must be >= 1 and <= last_notification".into(),
            });
        }
    }

    errors
}

/// Step 4: acyclicity checks via DFS three-colouring, run on raw names
/// (pre-resolution) so a cyclic config never needs handles at all.
fn check_cycles(raw: &RawConfig) -> Vec<GraphError> {
    let mut errors = Vec::new();

    let host_names: Vec<&str> = raw.host.keys().map(|s| s.as_str()).collect();
    let parent_cycle = find_cycle(&host_names, |name| {
        raw.host
            .get(*name)
            .map(|h| h.parents.iter().map(|s| s.as_str()).collect::<Vec<_>>())
            .unwrap_or_default()
    });
    if let Some(cycle) = parent_cycle {
        errors.push(GraphError::Cycle {
            kind: "parent/child host",
            cycle: cycle.join(" -> "),
        });
    }

    let tp_names: Vec<&str> = raw.timeperiod.keys().map(|s| s.as_str()).collect();
    let tp_cycle = find_cycle(&tp_names, |name| {
        raw.timeperiod
            .get(*name)
            .map(|tp| tp.exclude.iter().map(|s| s.as_str()).collect::<Vec<_>>())
            .unwrap_or_default()
    });
    if let Some(cycle) = tp_cycle {
        errors.push(GraphError::Cycle {
            kind: "timeperiod exclusion",
            cycle: cycle.join(" -> "),
        });
    }

    for (label, deps, entity_kind) in [
        ("service execution", &raw.service_dependency, RawDependencyKind::Execution),
        ("service notification", &raw.service_dependency, RawDependencyKind::Notification),
        ("host execution", &raw.host_dependency, RawDependencyKind::Execution),
        ("host notification", &raw.host_dependency, RawDependencyKind::Notification),
    ] {
        let relevant: Vec<&cfg::RawDependency> = deps.iter().filter(|d| d.kind == entity_kind).collect();
        let mut nodes: HashSet<String> = HashSet::new();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for dep in &relevant {
            let master_key = dep_node_key(&dep.master_host, &dep.master_service);
            let dependent_key = dep_node_key(&dep.dependent_host, &dep.dependent_service);
            nodes.insert(master_key.clone());
            nodes.insert(dependent_key.clone());
            // Dependent depends on master: an edge dependent -> master means
            // "must resolve master first"; a cycle here is a real circular
            // dependency regardless of direction convention.
            adjacency.entry(dependent_key).or_default().push(master_key);
        }
        let node_vec: Vec<String> = nodes.into_iter().collect();
        let cycle = find_cycle(&node_vec, |n| {
            adjacency.get(n).cloned().unwrap_or_default()
        });
        if let Some(cycle) = cycle {
            errors.push(GraphError::Cycle {
                kind: match label {
                    "service execution" => "service-dependency execution",
                    "service notification" => "service-dependency notification",
                    "host execution" => "host-dependency execution",
                    _ => "host-dependency notification",
                },
                cycle: cycle.join(" -> "),
            });
        }
    }

    errors
}

fn dep_node_key(host: &str, service: &Option<String>) -> String {
    match service {
        Some(s) => format!("{host}/{s}"),
        None => host.to_string(),
    }
}

fn parse_timezone(tz: &Option<String>) -> Tz {
    tz.as_deref()
        .and_then(|s| s.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

fn parse_weekday(s: &str) -> Option<chrono::Weekday> {
    use chrono::Weekday::*;
    Some(match s.to_ascii_lowercase().as_str() {
        "monday" => Mon,
        "tuesday" => Tue,
        "wednesday" => Wed,
        "thursday" => Thu,
        "friday" => Fri,
        "saturday" => Sat,
        "sunday" => Sun,
        _ => return None,
    })
}

fn parse_range(raw: &cfg::RawDateRange) -> Option<TimeRange> {
    let range = parse_weekday(&raw.range).map(DayOfWeekRange::Weekday)?;
    let start = chrono::NaiveTime::parse_from_str(&raw.start, "%H:%M").ok()?;
    let end = chrono::NaiveTime::parse_from_str(&raw.end, "%H:%M").ok()?;
    Some(TimeRange { range, start, end })
}

/// Builds a brand-new [`ObjectGraph`] from `raw`, and computes the diff
/// against `previous` (if any). Runs steps 1-5 of spec.md §4.7; step 6
/// (retention merge) and step 8 (re-arm) are the caller's responsibility
/// since they need the event queue and a retention snapshot this module
/// doesn't own.
pub fn apply_config(
    previous: Option<&ObjectGraph>,
    raw: &RawConfig,
) -> Result<(ObjectGraph, DiffResult), ValidationErrors> {
    let mut errors = validate_raw(raw);
    errors.extend(check_cycles(raw));
    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }

    let mut graph = ObjectGraph::default();
    graph.generation = previous.map(|g| g.generation + 1).unwrap_or(0);

    // timeperiods
    let mut tp_handles: HashMap<&str, TimeperiodHandle> = HashMap::new();
    for (name, _) in &raw.timeperiod {
        let handle = graph.push_timeperiod(Timeperiod {
            name: name.clone(),
            ranges: Vec::new(),
            exclude: Vec::new(),
            timezone: Tz::UTC,
        });
        graph.index_timeperiod(name.clone(), handle);
        tp_handles.insert(name.as_str(), handle);
    }
    for (name, raw_tp) in &raw.timeperiod {
        let handle = tp_handles[name.as_str()];
        let ranges = raw_tp.ranges.iter().filter_map(parse_range).collect();
        let exclude = raw_tp
            .exclude
            .iter()
            .filter_map(|n| tp_handles.get(n.as_str()).copied())
            .collect();
        *graph.timeperiod_mut(handle).unwrap() = Timeperiod {
            name: name.clone(),
            ranges,
            exclude,
            timezone: parse_timezone(&raw_tp.timezone),
        };
    }

    // commands
    let mut cmd_handles: HashMap<&str, CommandHandle> = HashMap::new();
    for (name, raw_cmd) in &raw.command {
        let handle = graph.push_command(Command {
            name: name.clone(),
            line: raw_cmd.line.clone(),
        });
        graph.index_command(name.clone(), handle);
        cmd_handles.insert(name.as_str(), handle);
    }

    // contacts (two-phase: allocate then fill, since contactgroup back-refs
    // need contact handles that don't exist until this loop runs once)
    let mut contact_handles: HashMap<&str, ContactHandle> = HashMap::new();
    for name in raw.contact.keys() {
        let handle = graph.push_contact(Contact::default());
        graph.index_contact(name.clone(), handle);
        contact_handles.insert(name.as_str(), handle);
    }
    for (name, raw_contact) in &raw.contact {
        let handle = contact_handles[name.as_str()];
        let host_notification_options = parse_host_mask(&raw_contact.host_notification_options);
        let service_notification_options = parse_service_mask(&raw_contact.service_notification_options);
        *graph.contact_mut(handle).unwrap() = Contact {
            name: name.clone(),
            alias: raw_contact.alias.clone(),
            email: raw_contact.email.clone(),
            pager: raw_contact.pager.clone(),
            addresses: raw_contact.addresses.clone(),
            host_notification_commands: raw_contact
                .host_notification_commands
                .iter()
                .filter_map(|c| cmd_handles.get(c.as_str()).copied())
                .collect(),
            service_notification_commands: raw_contact
                .service_notification_commands
                .iter()
                .filter_map(|c| cmd_handles.get(c.as_str()).copied())
                .collect(),
            host_notification_period: tp_handles.get(raw_contact.host_notification_period.as_str()).copied(),
            service_notification_period: tp_handles
                .get(raw_contact.service_notification_period.as_str())
                .copied(),
            host_notification_options,
            service_notification_options,
            can_submit_commands: raw_contact.can_submit_commands,
            contactgroups: HashSet::new(),
        };
    }

    // contactgroups + back-references
    let mut contactgroup_handles: HashMap<&str, ContactgroupHandle> = HashMap::new();
    for (name, raw_cg) in &raw.contactgroup {
        let members: HashSet<ContactHandle> = raw_cg
            .members
            .iter()
            .filter_map(|m| contact_handles.get(m.as_str()).copied())
            .collect();
        let handle = graph.push_contactgroup(Contactgroup {
            name: name.clone(),
            alias: raw_cg.alias.clone(),
            members: members.clone(),
        });
        graph.index_contactgroup(name.clone(), handle);
        contactgroup_handles.insert(name.as_str(), handle);
        for member in members {
            graph.contact_mut(member).unwrap().contactgroups.insert(handle);
        }
    }

    // hosts (allocate first so parent/child handles can resolve both ways)
    let mut host_handles: HashMap<&str, HostHandle> = HashMap::new();
    for name in raw.host.keys() {
        let handle = graph.push_host(blank_host());
        graph.index_host(name.clone(), handle);
        host_handles.insert(name.as_str(), handle);
    }
    for (name, raw_host) in &raw.host {
        let handle = host_handles[name.as_str()];
        let parents: HashSet<HostHandle> = raw_host
            .parents
            .iter()
            .filter_map(|p| host_handles.get(p.as_str()).copied())
            .collect();
        let contacts: HashSet<ContactHandle> = raw_host
            .contacts
            .iter()
            .filter_map(|c| contact_handles.get(c.as_str()).copied())
            .collect();
        let contact_groups: HashSet<ContactgroupHandle> = raw_host
            .contact_groups
            .iter()
            .filter_map(|c| contactgroup_handles.get(c.as_str()).copied())
            .collect();
        let notification_period_name = if raw_host.notification_period.is_empty() {
            &raw_host.check_period
        } else {
            &raw_host.notification_period
        };
        let host = Host {
            name: name.clone(),
            alias: raw_host.alias.clone(),
            address: raw_host.address.clone(),
            check_command: raw_host.check_command.as_deref().and_then(|c| cmd_handles.get(c).copied()),
            check_interval_secs: raw_host.check_interval_min * raw.main.interval_length_secs as f64,
            retry_interval_secs: raw_host.retry_interval_min * raw.main.interval_length_secs as f64,
            max_attempts: raw_host.max_attempts,
            check_period: tp_handles[raw_host.check_period.as_str()],
            event_handler: raw_host.event_handler.as_deref().and_then(|c| cmd_handles.get(c).copied()),
            notification_period: tp_handles[notification_period_name.as_str()],
            notification_interval_secs: raw_host.notification_interval_min * raw.main.interval_length_secs as f64,
            first_notification_delay_secs: raw_host.first_notification_delay_min * raw.main.interval_length_secs as f64,
            recovery_notification_delay_secs: raw_host.recovery_notification_delay_min
                * raw.main.interval_length_secs as f64,
            low_flap_threshold: raw_host.low_flap_threshold,
            high_flap_threshold: raw_host.high_flap_threshold,
            freshness_threshold_secs: raw_host.freshness_threshold_secs,
            process_perfdata: raw_host.process_perfdata,
            notification_options: parse_host_mask(&raw_host.notification_options),
            stalking_options: parse_stalking_mask(&raw_host.stalking_options),
            parents: parents.clone(),
            children: HashSet::new(),
            contacts,
            contact_groups,
            escalations: HashSet::new(),
            services: HashSet::new(),
            current_state: HostState::Up,
            last_state: HostState::Up,
            last_hard_state: HostState::Up,
            runtime: CheckableRuntime {
                checks_enabled: raw_host.checks_enabled,
                notifications_enabled: raw_host.notifications_enabled,
                ..CheckableRuntime::default()
            },
        };
        *graph.host_mut(handle).unwrap() = host;
        for parent in parents {
            graph.host_mut(parent).unwrap().children.insert(handle);
        }
    }

    // services
    let mut service_handles: HashMap<(&str, &str), ServiceHandle> = HashMap::new();
    for (_, raw_svc) in &raw.service {
        let key = (raw_svc.host.as_str(), raw_svc.description.as_str());
        let handle = graph.push_service(blank_service(host_handles[raw_svc.host.as_str()]));
        graph.index_service(raw_svc.host.clone(), raw_svc.description.clone(), handle);
        service_handles.insert(key, handle);
    }
    for (_, raw_svc) in &raw.service {
        let key = (raw_svc.host.as_str(), raw_svc.description.as_str());
        let handle = service_handles[&key];
        let host_handle = host_handles[raw_svc.host.as_str()];
        let contacts: HashSet<ContactHandle> = raw_svc
            .contacts
            .iter()
            .filter_map(|c| contact_handles.get(c.as_str()).copied())
            .collect();
        let contact_groups: HashSet<ContactgroupHandle> = raw_svc
            .contact_groups
            .iter()
            .filter_map(|c| contactgroup_handles.get(c.as_str()).copied())
            .collect();
        let notification_period_name = if raw_svc.notification_period.is_empty() {
            &raw_svc.check_period
        } else {
            &raw_svc.notification_period
        };
        let service = Service {
            host: host_handle,
            description: raw_svc.description.clone(),
            alias: raw_svc.alias.clone(),
            check_command: cmd_handles[raw_svc.check_command.as_str()],
            check_interval_secs: raw_svc.check_interval_min * raw.main.interval_length_secs as f64,
            retry_interval_secs: raw_svc.retry_interval_min * raw.main.interval_length_secs as f64,
            max_attempts: raw_svc.max_attempts,
            check_period: tp_handles[raw_svc.check_period.as_str()],
            event_handler: raw_svc.event_handler.as_deref().and_then(|c| cmd_handles.get(c).copied()),
            notification_period: tp_handles[notification_period_name.as_str()],
            notification_interval_secs: raw_svc.notification_interval_min * raw.main.interval_length_secs as f64,
            first_notification_delay_secs: raw_svc.first_notification_delay_min
                * raw.main.interval_length_secs as f64,
            recovery_notification_delay_secs: raw_svc.recovery_notification_delay_min
                * raw.main.interval_length_secs as f64,
            low_flap_threshold: raw_svc.low_flap_threshold,
            high_flap_threshold: raw_svc.high_flap_threshold,
            freshness_threshold_secs: raw_svc.freshness_threshold_secs,
            process_perfdata: raw_svc.process_perfdata,
            notification_options: parse_service_notification_mask(&raw_svc.notification_options),
            stalking_options: parse_stalking_mask(&raw_svc.stalking_options),
            is_volatile: raw_svc.is_volatile,
            contacts,
            contact_groups,
            escalations: HashSet::new(),
            current_state: ServiceState::Ok,
            last_state: ServiceState::Ok,
            last_hard_state: ServiceState::Ok,
            runtime: CheckableRuntime {
                checks_enabled: raw_svc.checks_enabled,
                notifications_enabled: raw_svc.notifications_enabled,
                ..CheckableRuntime::default()
            },
        };
        *graph.service_mut(handle).unwrap() = service;
        graph.host_mut(host_handle).unwrap().services.insert(handle);
    }

    // dependencies
    for raw_dep in raw.host_dependency.iter().chain(&raw.service_dependency) {
        let master = resolve_dep_entity(&host_handles, &service_handles, &raw_dep.master_host, &raw_dep.master_service);
        let dependent = resolve_dep_entity(
            &host_handles,
            &service_handles,
            &raw_dep.dependent_host,
            &raw_dep.dependent_service,
        );
        let (Some(master), Some(dependent)) = (master, dependent) else {
            continue;
        };
        graph.push_dependency(Dependency {
            master,
            dependent,
            kind: match raw_dep.kind {
                RawDependencyKind::Execution => DependencyKind::Execution,
                RawDependencyKind::Notification => DependencyKind::Notification,
            },
            timeperiod: raw_dep.timeperiod.as_deref().and_then(|t| tp_handles.get(t).copied()),
            inherits_parent: raw_dep.inherits_parent,
            fail_on: parse_fail_on_mask(&raw_dep.fail_on),
        });
    }

    // escalations
    for raw_esc in raw.host_escalation.iter().chain(&raw.service_escalation) {
        let entity = resolve_dep_entity(&host_handles, &service_handles, &raw_esc.host, &raw_esc.service);
        let Some(entity) = entity else { continue };
        let contacts: HashSet<ContactHandle> = raw_esc
            .contacts
            .iter()
            .filter_map(|c| contact_handles.get(c.as_str()).copied())
            .collect();
        let contact_groups: HashSet<ContactgroupHandle> = raw_esc
            .contact_groups
            .iter()
            .filter_map(|c| contactgroup_handles.get(c.as_str()).copied())
            .collect();
        let handle = graph.push_escalation(Escalation {
            entity,
            first_notification: raw_esc.first_notification,
            last_notification: raw_esc.last_notification,
            notification_interval_secs: raw_esc.notification_interval_min * raw.main.interval_length_secs as f64,
            timeperiod: raw_esc.timeperiod.as_deref().and_then(|t| tp_handles.get(t).copied()),
            escalate_on: parse_fail_on_mask(&raw_esc.escalate_on),
            contacts,
            contact_groups,
        });
        match entity {
            DependencyEntity::Host(h) => {
                graph.host_mut(h).unwrap().escalations.insert(handle);
            }
            DependencyEntity::Service(s) => {
                graph.service_mut(s).unwrap().escalations.insert(handle);
            }
        }
    }

    let diff = compute_diff(previous, &graph);

    Ok((graph, diff))
}

fn resolve_dep_entity(
    host_handles: &HashMap<&str, HostHandle>,
    service_handles: &HashMap<(&str, &str), ServiceHandle>,
    host: &str,
    service: &Option<String>,
) -> Option<DependencyEntity> {
    match service {
        Some(svc) => service_handles
            .get(&(host, svc.as_str()))
            .map(|h| DependencyEntity::Service(*h)),
        None => host_handles.get(host).map(|h| DependencyEntity::Host(*h)),
    }
}

/// Step 5: names present in both generations only land in `modified` when
/// their config-relevant fields actually differ (spec.md §8's round-trip
/// law: applying the same config twice yields an empty diff). Handles are
/// positional and not stable across generations, so every handle-typed
/// field is resolved to a name against its *own* graph before comparing;
/// back-reference fields populated from other entities' config (host
/// children/services/escalations, contact contactgroups, ...) are excluded
/// since they don't reflect this entity's own configuration.
fn compute_diff(previous: Option<&ObjectGraph>, graph: &ObjectGraph) -> DiffResult {
    let mut diff = DiffResult::default();
    let Some(previous) = previous else {
        diff.hosts.added = graph.iter_hosts().map(|(_, h)| h.name.clone()).collect();
        diff.services.added = graph
            .iter_services()
            .map(|(_, s)| format!("{}/{}", graph.host(s.host).map(|h| h.name.as_str()).unwrap_or("?"), s.description))
            .collect();
        diff.contacts.added = graph.iter_contacts().map(|(_, c)| c.name.clone()).collect();
        diff.contactgroups.added = graph.iter_contactgroups().map(|(_, c)| c.name.clone()).collect();
        diff.timeperiods.added = graph.iter_timeperiods().map(|(_, t)| t.name.clone()).collect();
        diff.commands.added = graph.iter_commands().map(|(_, c)| c.name.clone()).collect();
        diff.hosts.added.sort();
        diff.services.added.sort();
        diff.contacts.added.sort();
        diff.contactgroups.added.sort();
        diff.timeperiods.added.sort();
        diff.commands.added.sort();
        return diff;
    };

    diff_hosts(previous, graph, &mut diff.hosts);
    diff_services(previous, graph, &mut diff.services);
    diff_contacts(previous, graph, &mut diff.contacts);
    diff_contactgroups(previous, graph, &mut diff.contactgroups);
    diff_timeperiods(previous, graph, &mut diff.timeperiods);
    diff_commands(previous, graph, &mut diff.commands);

    diff
}

fn diff_entities(prev_names: HashSet<String>, new_names: HashSet<String>, changed: impl Fn(&str) -> bool, out: &mut EntityDiff) {
    out.added = new_names.difference(&prev_names).cloned().collect();
    out.removed = prev_names.difference(&new_names).cloned().collect();
    out.modified = new_names.intersection(&prev_names).filter(|name| changed(name)).cloned().collect();
    out.added.sort();
    out.removed.sort();
    out.modified.sort();
}

fn diff_hosts(previous: &ObjectGraph, graph: &ObjectGraph, out: &mut EntityDiff) {
    let prev_names: HashSet<String> = previous.iter_hosts().map(|(_, h)| h.name.clone()).collect();
    let new_names: HashSet<String> = graph.iter_hosts().map(|(_, h)| h.name.clone()).collect();
    diff_entities(
        prev_names,
        new_names,
        |name| {
            let (Some(old), Some(new)) = (previous.find_host(name), graph.find_host(name)) else {
                return true;
            };
            host_signature(previous, previous.host(old).unwrap()) != host_signature(graph, graph.host(new).unwrap())
        },
        out,
    );
}

fn diff_services(previous: &ObjectGraph, graph: &ObjectGraph, out: &mut EntityDiff) {
    let prev_names: HashSet<String> = previous
        .iter_services()
        .map(|(_, s)| format!("{}/{}", previous.host(s.host).map(|h| h.name.as_str()).unwrap_or("?"), s.description))
        .collect();
    let new_names: HashSet<String> = graph
        .iter_services()
        .map(|(_, s)| format!("{}/{}", graph.host(s.host).map(|h| h.name.as_str()).unwrap_or("?"), s.description))
        .collect();
    diff_entities(
        prev_names,
        new_names,
        |name| {
            let Some((host, desc)) = name.split_once('/') else {
                return true;
            };
            let (Some(old), Some(new)) = (previous.find_service(host, desc), graph.find_service(host, desc)) else {
                return true;
            };
            service_signature(previous, previous.service(old).unwrap()) != service_signature(graph, graph.service(new).unwrap())
        },
        out,
    );
}

fn diff_contacts(previous: &ObjectGraph, graph: &ObjectGraph, out: &mut EntityDiff) {
    let prev_names: HashSet<String> = previous.iter_contacts().map(|(_, c)| c.name.clone()).collect();
    let new_names: HashSet<String> = graph.iter_contacts().map(|(_, c)| c.name.clone()).collect();
    diff_entities(
        prev_names,
        new_names,
        |name| {
            let (Some(old), Some(new)) = (previous.find_contact(name), graph.find_contact(name)) else {
                return true;
            };
            contact_signature(previous, previous.contact(old).unwrap()) != contact_signature(graph, graph.contact(new).unwrap())
        },
        out,
    );
}

fn diff_contactgroups(previous: &ObjectGraph, graph: &ObjectGraph, out: &mut EntityDiff) {
    let prev_names: HashSet<String> = previous.iter_contactgroups().map(|(_, c)| c.name.clone()).collect();
    let new_names: HashSet<String> = graph.iter_contactgroups().map(|(_, c)| c.name.clone()).collect();
    diff_entities(
        prev_names,
        new_names,
        |name| {
            let (Some(old), Some(new)) = (previous.find_contactgroup(name), graph.find_contactgroup(name)) else {
                return true;
            };
            contactgroup_signature(previous, previous.contactgroup(old).unwrap())
                != contactgroup_signature(graph, graph.contactgroup(new).unwrap())
        },
        out,
    );
}

fn diff_timeperiods(previous: &ObjectGraph, graph: &ObjectGraph, out: &mut EntityDiff) {
    let prev_names: HashSet<String> = previous.iter_timeperiods().map(|(_, t)| t.name.clone()).collect();
    let new_names: HashSet<String> = graph.iter_timeperiods().map(|(_, t)| t.name.clone()).collect();
    diff_entities(
        prev_names,
        new_names,
        |name| {
            let (Some(old), Some(new)) = (previous.find_timeperiod(name), graph.find_timeperiod(name)) else {
                return true;
            };
            timeperiod_signature(previous, previous.timeperiod(old).unwrap())
                != timeperiod_signature(graph, graph.timeperiod(new).unwrap())
        },
        out,
    );
}

fn diff_commands(previous: &ObjectGraph, graph: &ObjectGraph, out: &mut EntityDiff) {
    let prev_names: HashSet<String> = previous.iter_commands().map(|(_, c)| c.name.clone()).collect();
    let new_names: HashSet<String> = graph.iter_commands().map(|(_, c)| c.name.clone()).collect();
    diff_entities(
        prev_names,
        new_names,
        |name| {
            let (Some(old), Some(new)) = (previous.find_command(name), graph.find_command(name)) else {
                return true;
            };
            previous.command(old).unwrap().line != graph.command(new).unwrap().line
        },
        out,
    );
}

#[derive(PartialEq)]
struct HostSignature {
    alias: String,
    address: String,
    check_command: Option<String>,
    check_interval_secs: f64,
    retry_interval_secs: f64,
    max_attempts: u32,
    check_period: String,
    event_handler: Option<String>,
    notification_period: String,
    notification_interval_secs: f64,
    first_notification_delay_secs: f64,
    recovery_notification_delay_secs: f64,
    low_flap_threshold: f64,
    high_flap_threshold: f64,
    freshness_threshold_secs: u64,
    process_perfdata: bool,
    notification_options: HostNotificationMask,
    stalking_options: StalkingMask,
    parents: BTreeSet<String>,
    contacts: BTreeSet<String>,
    contact_groups: BTreeSet<String>,
}

fn host_signature(g: &ObjectGraph, h: &Host) -> HostSignature {
    HostSignature {
        alias: h.alias.clone(),
        address: h.address.clone(),
        check_command: h.check_command.and_then(|c| g.command(c)).map(|c| c.name.clone()),
        check_interval_secs: h.check_interval_secs,
        retry_interval_secs: h.retry_interval_secs,
        max_attempts: h.max_attempts,
        check_period: g.timeperiod(h.check_period).map(|t| t.name.clone()).unwrap_or_default(),
        event_handler: h.event_handler.and_then(|c| g.command(c)).map(|c| c.name.clone()),
        notification_period: g.timeperiod(h.notification_period).map(|t| t.name.clone()).unwrap_or_default(),
        notification_interval_secs: h.notification_interval_secs,
        first_notification_delay_secs: h.first_notification_delay_secs,
        recovery_notification_delay_secs: h.recovery_notification_delay_secs,
        low_flap_threshold: h.low_flap_threshold,
        high_flap_threshold: h.high_flap_threshold,
        freshness_threshold_secs: h.freshness_threshold_secs,
        process_perfdata: h.process_perfdata,
        notification_options: h.notification_options,
        stalking_options: h.stalking_options,
        parents: h.parents.iter().filter_map(|p| g.host(*p)).map(|p| p.name.clone()).collect(),
        contacts: h.contacts.iter().filter_map(|c| g.contact(*c)).map(|c| c.name.clone()).collect(),
        contact_groups: h.contact_groups.iter().filter_map(|c| g.contactgroup(*c)).map(|c| c.name.clone()).collect(),
    }
}

#[derive(PartialEq)]
struct ServiceSignature {
    alias: String,
    check_command: String,
    check_interval_secs: f64,
    retry_interval_secs: f64,
    max_attempts: u32,
    check_period: String,
    event_handler: Option<String>,
    notification_period: String,
    notification_interval_secs: f64,
    first_notification_delay_secs: f64,
    recovery_notification_delay_secs: f64,
    low_flap_threshold: f64,
    high_flap_threshold: f64,
    freshness_threshold_secs: u64,
    process_perfdata: bool,
    notification_options: ServiceNotificationMask,
    stalking_options: StalkingMask,
    is_volatile: bool,
    contacts: BTreeSet<String>,
    contact_groups: BTreeSet<String>,
}

fn service_signature(g: &ObjectGraph, s: &Service) -> ServiceSignature {
    ServiceSignature {
        alias: s.alias.clone(),
        check_command: g.command(s.check_command).map(|c| c.name.clone()).unwrap_or_default(),
        check_interval_secs: s.check_interval_secs,
        retry_interval_secs: s.retry_interval_secs,
        max_attempts: s.max_attempts,
        check_period: g.timeperiod(s.check_period).map(|t| t.name.clone()).unwrap_or_default(),
        event_handler: s.event_handler.and_then(|c| g.command(c)).map(|c| c.name.clone()),
        notification_period: g.timeperiod(s.notification_period).map(|t| t.name.clone()).unwrap_or_default(),
        notification_interval_secs: s.notification_interval_secs,
        first_notification_delay_secs: s.first_notification_delay_secs,
        recovery_notification_delay_secs: s.recovery_notification_delay_secs,
        low_flap_threshold: s.low_flap_threshold,
        high_flap_threshold: s.high_flap_threshold,
        freshness_threshold_secs: s.freshness_threshold_secs,
        process_perfdata: s.process_perfdata,
        notification_options: s.notification_options,
        stalking_options: s.stalking_options,
        is_volatile: s.is_volatile,
        contacts: s.contacts.iter().filter_map(|c| g.contact(*c)).map(|c| c.name.clone()).collect(),
        contact_groups: s.contact_groups.iter().filter_map(|c| g.contactgroup(*c)).map(|c| c.name.clone()).collect(),
    }
}

#[derive(PartialEq)]
struct ContactSignature {
    alias: String,
    email: String,
    pager: String,
    addresses: Vec<String>,
    host_notification_commands: Vec<String>,
    service_notification_commands: Vec<String>,
    host_notification_period: Option<String>,
    service_notification_period: Option<String>,
    host_notification_options: HostNotificationMask,
    service_notification_options: ServiceNotificationMask,
    can_submit_commands: bool,
}

fn contact_signature(g: &ObjectGraph, c: &Contact) -> ContactSignature {
    ContactSignature {
        alias: c.alias.clone(),
        email: c.email.clone(),
        pager: c.pager.clone(),
        addresses: c.addresses.clone(),
        host_notification_commands: c
            .host_notification_commands
            .iter()
            .filter_map(|cmd| g.command(*cmd))
            .map(|cmd| cmd.name.clone())
            .collect(),
        service_notification_commands: c
            .service_notification_commands
            .iter()
            .filter_map(|cmd| g.command(*cmd))
            .map(|cmd| cmd.name.clone())
            .collect(),
        host_notification_period: c.host_notification_period.and_then(|t| g.timeperiod(t)).map(|t| t.name.clone()),
        service_notification_period: c.service_notification_period.and_then(|t| g.timeperiod(t)).map(|t| t.name.clone()),
        host_notification_options: c.host_notification_options,
        service_notification_options: c.service_notification_options,
        can_submit_commands: c.can_submit_commands,
    }
}

#[derive(PartialEq)]
struct ContactgroupSignature {
    alias: String,
    members: BTreeSet<String>,
}

fn contactgroup_signature(g: &ObjectGraph, cg: &Contactgroup) -> ContactgroupSignature {
    ContactgroupSignature {
        alias: cg.alias.clone(),
        members: cg.members.iter().filter_map(|m| g.contact(*m)).map(|c| c.name.clone()).collect(),
    }
}

#[derive(PartialEq)]
struct TimeperiodSignature {
    ranges: Vec<TimeRange>,
    exclude: BTreeSet<String>,
    timezone: Tz,
}

fn timeperiod_signature(g: &ObjectGraph, tp: &Timeperiod) -> TimeperiodSignature {
    TimeperiodSignature {
        ranges: tp.ranges.clone(),
        exclude: tp.exclude.iter().filter_map(|e| g.timeperiod(*e)).map(|e| e.name.clone()).collect(),
        timezone: tp.timezone,
    }
}

fn blank_host() -> Host {
    Host {
        name: String::new(),
        alias: String::new(),
        address: String::new(),
        check_command: None,
        check_interval_secs: 0.0,
        retry_interval_secs: 0.0,
        max_attempts: 1,
        check_period: TimeperiodHandle::new(0),
        event_handler: None,
        notification_period: TimeperiodHandle::new(0),
        notification_interval_secs: 0.0,
        first_notification_delay_secs: 0.0,
        recovery_notification_delay_secs: 0.0,
        low_flap_threshold: 25.0,
        high_flap_threshold: 50.0,
        freshness_threshold_secs: 0,
        process_perfdata: true,
        notification_options: HostNotificationMask::empty(),
        stalking_options: StalkingMask::empty(),
        parents: HashSet::new(),
        children: HashSet::new(),
        contacts: HashSet::new(),
        contact_groups: HashSet::new(),
        escalations: HashSet::new(),
        services: HashSet::new(),
        current_state: HostState::Up,
        last_state: HostState::Up,
        last_hard_state: HostState::Up,
        runtime: CheckableRuntime::default(),
    }
}

fn blank_service(host: HostHandle) -> Service {
    Service {
        host,
        description: String::new(),
        alias: String::new(),
        check_command: CommandHandle::new(0),
        check_interval_secs: 0.0,
        retry_interval_secs: 0.0,
        max_attempts: 1,
        check_period: TimeperiodHandle::new(0),
        event_handler: None,
        notification_period: TimeperiodHandle::new(0),
        notification_interval_secs: 0.0,
        first_notification_delay_secs: 0.0,
        recovery_notification_delay_secs: 0.0,
        low_flap_threshold: 25.0,
        high_flap_threshold: 50.0,
        freshness_threshold_secs: 0,
        process_perfdata: true,
        notification_options: ServiceNotificationMask::empty(),
        stalking_options: StalkingMask::empty(),
        is_volatile: false,
        contacts: HashSet::new(),
        contact_groups: HashSet::new(),
        escalations: HashSet::new(),
        current_state: ServiceState::Ok,
        last_state: ServiceState::Ok,
        last_hard_state: ServiceState::Ok,
        runtime: CheckableRuntime::default(),
    }
}

fn parse_host_mask(options: &[String]) -> HostNotificationMask {
    let mut mask = HostNotificationMask::empty();
    for o in options {
        match o.to_ascii_lowercase().as_str() {
            "d" | "down" => mask |= HostNotificationMask::DOWN,
            "u" | "unreachable" => mask |= HostNotificationMask::UNREACHABLE,
            "r" | "recovery" => mask |= HostNotificationMask::RECOVERY,
            "f" | "flapping" => mask |= HostNotificationMask::FLAPPING,
            "s" | "downtime" => mask |= HostNotificationMask::DOWNTIME,
            "a" | "all" => mask = HostNotificationMask::all(),
            _ => {}
        }
    }
    mask
}

fn parse_service_mask(options: &[String]) -> ServiceNotificationMask {
    parse_service_notification_mask(options)
}

fn parse_service_notification_mask(options: &[String]) -> ServiceNotificationMask {
    let mut mask = ServiceNotificationMask::empty();
    for o in options {
        match o.to_ascii_lowercase().as_str() {
            "w" | "warning" => mask |= ServiceNotificationMask::WARNING,
            "u" | "unknown" => mask |= ServiceNotificationMask::UNKNOWN,
            "c" | "critical" => mask |= ServiceNotificationMask::CRITICAL,
            "r" | "recovery" => mask |= ServiceNotificationMask::RECOVERY,
            "f" | "flapping" => mask |= ServiceNotificationMask::FLAPPING,
            "s" | "downtime" => mask |= ServiceNotificationMask::DOWNTIME,
            "a" | "all" => mask = ServiceNotificationMask::all(),
            _ => {}
        }
    }
    mask
}

fn parse_stalking_mask(options: &[String]) -> StalkingMask {
    let mut mask = StalkingMask::empty();
    for o in options {
        match o.to_ascii_lowercase().as_str() {
            "o" | "ok" | "up" => mask |= StalkingMask::OK_UP,
            "w" | "warning" => mask |= StalkingMask::WARNING,
            "u" | "unknown" => mask |= StalkingMask::UNKNOWN,
            "c" | "critical" | "d" | "down" => mask |= StalkingMask::CRITICAL_DOWN,
            _ => {}
        }
    }
    mask
}

fn parse_fail_on_mask(states: &[String]) -> u8 {
    let mut mask = 0u8;
    for (i, s) in ["up", "down", "unreachable", "ok", "warning", "unknown", "critical"]
        .iter()
        .enumerate()
    {
        if states.iter().any(|x| x.eq_ignore_ascii_case(s)) {
            mask |= 1 << i;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use centinel_config::schema::{RawCommand, RawContact, RawContactgroup, RawDateRange, RawHost, RawService, RawTimeperiod};

    fn sample_config() -> RawConfig {
        let mut raw = RawConfig::default();
        raw.timeperiod.insert(
            "always".to_string(),
            RawTimeperiod {
                alias: "Always".into(),
                ranges: vec![RawDateRange {
                    range: "monday".into(),
                    start: "00:00".into(),
                    end: "24:00".into(),
                }],
                exclude: Vec::new(),
                timezone: None,
            },
        );
        raw.command.insert(
            "check_ping".to_string(),
            RawCommand { line: "/bin/true".into() },
        );
        raw.contact.insert(
            "alice".to_string(),
            RawContact {
                email: "alice@example.com".into(),
                host_notification_commands: vec!["check_ping".into()],
                host_notification_period: "always".into(),
                ..Default::default()
            },
        );
        raw.contactgroup.insert(
            "admins".to_string(),
            RawContactgroup {
                members: vec!["alice".into()],
                ..Default::default()
            },
        );
        raw.host.insert(
            "web1".to_string(),
            RawHost {
                address: "127.0.0.1".into(),
                check_command: Some("check_ping".into()),
                check_period: "always".into(),
                notification_period: "always".into(),
                contacts: vec!["alice".into()],
                ..Default::default()
            },
        );
        raw.service.insert(
            "web1/http".to_string(),
            RawService {
                host: "web1".into(),
                description: "http".into(),
                check_command: "check_ping".into(),
                check_period: "always".into(),
                notification_period: "always".into(),
                ..Default::default()
            },
        );
        raw
    }

    #[test]
    fn reapplying_identical_config_yields_empty_diff() {
        let raw = sample_config();
        let (graph, first_diff) = apply_config(None, &raw).unwrap();
        assert!(!first_diff.is_empty());

        let (_, second_diff) = apply_config(Some(&graph), &raw).unwrap();
        assert!(second_diff.is_empty(), "expected empty diff on reapply, got {second_diff:?}");
    }

    #[test]
    fn changed_host_field_marks_only_that_host_modified() {
        let raw = sample_config();
        let (graph, _) = apply_config(None, &raw).unwrap();

        let mut changed = raw.clone();
        changed.host.get_mut("web1").unwrap().alias = "relabeled".into();
        let (_, diff) = apply_config(Some(&graph), &changed).unwrap();

        assert_eq!(diff.hosts.modified, vec!["web1".to_string()]);
        assert!(diff.hosts.added.is_empty());
        assert!(diff.hosts.removed.is_empty());
        assert!(diff.services.is_empty());
        assert!(diff.contacts.is_empty());
    }

    #[test]
    fn adding_a_service_does_not_mark_its_host_modified() {
        let raw = sample_config();
        let (graph, _) = apply_config(None, &raw).unwrap();

        let mut changed = raw.clone();
        changed.service.insert(
            "web1/disk".to_string(),
            RawService {
                host: "web1".into(),
                description: "disk".into(),
                check_command: "check_ping".into(),
                check_period: "always".into(),
                notification_period: "always".into(),
                ..Default::default()
            },
        );
        let (_, diff) = apply_config(Some(&graph), &changed).unwrap();

        assert_eq!(diff.services.added, vec!["web1/disk".to_string()]);
        assert!(diff.hosts.is_empty());
    }
}
