//! The event loop (spec.md §5): single-threaded and cooperative. It blocks
//! only on the next due event or the arrival of a completed check result,
//! whichever comes first; check subprocesses themselves run in parallel
//! across the process boundary via [`tokio::spawn`].

use crate::error::Result;
use centinel_config::schema::RawConfig;
use centinel_config::{load_from_file, ResourceTable};
use centinel_core::handle::{EntityHandle, HostHandle, ServiceHandle};
use centinel_core::macros::MacroContext;
use centinel_core::notify::{contact_is_eligible, is_viable, resolve_recipients, state_bit, Reason, RecipientQuery, ViabilityInputs};
use centinel_core::object_graph::{apply_config, AcknowledgementType, HostState, ObjectGraph, ServiceState};
use centinel_core::schedule::{derive_params, place_hosts, place_services, EventKind, EventQueue, NewEvent};
use centinel_core::state::{apply_transition, coerce_active_host_state, coerce_service_state, parse_plugin_output, NotificationReason};
use centinel_core::timeperiod::{self, TimeperiodRegistry};
use centinel_core::IdSequences;
use centinel_dispatch::command_file::parse_command_line;
use centinel_dispatch::status_file::{Block, write_blocks};
use centinel_dispatch::{load_and_merge, run_check, write_retention, CommandBuffer, DispatchedResult, InFlightTracker};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 60;

enum Completion {
    Host(HostHandle, DispatchedResult),
    Service(ServiceHandle, DispatchedResult),
}

/// Everything the loop needs that survives a reload: the active graph
/// generation, its matching timeperiod snapshot, the queue, and the
/// id sequences (spec.md §5 "global counters are plain fields of the
/// engine value, never free globals/statics").
struct Engine {
    graph: ObjectGraph,
    registry: TimeperiodRegistry,
    queue: EventQueue,
    ids: IdSequences,
    raw: RawConfig,
    resources: ResourceTable,
    in_flight: InFlightTracker,
    command_buffer: CommandBuffer,
    command_file_offset: u64,
    status_path: PathBuf,
    retention_path: PathBuf,
    command_path: PathBuf,
    config_path: PathBuf,
}

/// Loads configuration, builds the initial graph, and runs the loop until
/// interrupted. Returns `Ok(())` on a clean shutdown; startup configuration
/// failures are the only case that should translate to a non-zero exit
/// (spec.md §6 "Exit codes").
pub async fn run(config_path: &Path) -> Result<()> {
    let raw = load_from_file(config_path)?;
    let resources = ResourceTable::load(Path::new(&raw.main.resource_file)).unwrap_or_else(|e| {
        warn!(error = %e, "resource file unreadable, continuing with no $USERx$ macros");
        ResourceTable::default()
    });
    let (graph, diff) = apply_config(None, &raw)?;
    info!(
        hosts = diff.hosts.added.len(),
        services = diff.services.added.len(),
        "configuration loaded"
    );

    let status_path = PathBuf::from(&raw.main.status_file);
    let retention_path = PathBuf::from(&raw.main.retention_file);
    let command_path = PathBuf::from(&raw.main.command_file);

    let mut graph = graph;
    if retention_path.exists() {
        if let Err(e) = load_and_merge(&retention_path, &mut graph) {
            warn!(error = %e, "retention file present but unreadable, starting from a clean state");
        } else {
            info!(path = %retention_path.display(), "retention state merged");
        }
    }

    let registry = graph.timeperiod_registry();
    let now = Utc::now();

    let mut queue = EventQueue::default();
    seed_check_events(&graph, &registry, now, &raw, &mut queue);
    seed_housekeeping_events(&raw, now, &mut queue);

    let command_buffer = CommandBuffer::new(raw.main.external_command_buffer_slots);
    let mut engine = Engine {
        graph,
        registry,
        queue,
        ids: IdSequences::default(),
        raw,
        resources,
        in_flight: InFlightTracker::default(),
        command_buffer,
        command_file_offset: 0,
        status_path,
        retention_path,
        command_path,
        config_path: config_path.to_path_buf(),
    };

    engine.main_loop().await
}

fn seed_check_events(graph: &ObjectGraph, registry: &TimeperiodRegistry, now: DateTime<Utc>, raw: &RawConfig, queue: &mut EventQueue) {
    let host_intervals: Vec<f64> = graph
        .iter_hosts()
        .filter(|(_, h)| h.runtime.checks_enabled && h.check_interval_secs > 0.0)
        .map(|(_, h)| h.check_interval_secs)
        .collect();
    let host_params = derive_params(
        &host_intervals,
        raw.main.host_inter_check_delay_method,
        0.0,
        raw.main.max_host_check_spread,
        centinel_config::schema::InterleaveFactorMethod::User,
        1,
        1.0,
    );
    for placement in place_hosts(graph, registry, now, &host_params) {
        queue.schedule(NewEvent {
            kind: EventKind::HostCheck,
            entity: Some(EntityHandle::Host(placement.host)),
            run_time: placement.at,
            interval: graph.host(placement.host).map(|h| h.check_interval_secs),
            compensate_for_time_change: true,
            forced: false,
        });
    }

    let service_intervals: Vec<f64> = graph
        .iter_services()
        .filter(|(_, s)| s.runtime.checks_enabled && s.check_interval_secs > 0.0)
        .map(|(_, s)| s.check_interval_secs)
        .collect();
    let services_per_host_avg = if graph.host_count() == 0 {
        0.0
    } else {
        graph.service_count() as f64 / graph.host_count() as f64
    };
    let service_params = derive_params(
        &service_intervals,
        raw.main.service_inter_check_delay_method,
        0.0,
        raw.main.max_service_check_spread,
        raw.main.service_interleave_factor_method,
        1,
        services_per_host_avg,
    );
    for placement in place_services(graph, registry, now, &service_params) {
        queue.schedule(NewEvent {
            kind: EventKind::ServiceCheck,
            entity: Some(EntityHandle::Service(placement.service)),
            run_time: placement.at,
            interval: graph.service(placement.service).map(|s| s.check_interval_secs),
            compensate_for_time_change: true,
            forced: false,
        });
    }
}

fn seed_housekeeping_events(raw: &RawConfig, now: DateTime<Utc>, queue: &mut EventQueue) {
    let mut push = |kind: EventKind, delay_secs: u64| {
        queue.schedule(NewEvent {
            kind,
            entity: None,
            run_time: now + chrono::Duration::seconds(delay_secs.max(1) as i64),
            interval: Some(delay_secs as f64),
            compensate_for_time_change: true,
            forced: false,
        });
    };
    push(EventKind::Reaper, raw.main.check_reaper_interval_secs);
    push(EventKind::RetentionSave, raw.main.retention_update_interval_secs);
    push(EventKind::StatusSave, raw.main.status_update_interval_secs);
    push(EventKind::CommandFilePoll, raw.main.command_check_interval_secs);
    push(EventKind::HostFreshnessSweep, raw.main.host_freshness_check_interval_secs);
    push(EventKind::ServiceFreshnessSweep, raw.main.service_freshness_check_interval_secs);
    push(EventKind::OrphanSweep, raw.main.check_reaper_interval_secs * 6);
    push(EventKind::AckExpire, 60);
}

impl Engine {
    async fn main_loop(&mut self) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

        loop {
            let next_run = self.queue.peek_next_run_time();
            let sleep = match next_run {
                Some(t) => {
                    let delta = (t - Utc::now()).to_std().unwrap_or(Duration::from_millis(0));
                    tokio::time::sleep(delta)
                }
                None => tokio::time::sleep(Duration::from_secs(5)),
            };
            tokio::pin!(sleep);

            tokio::select! {
                biased;

                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested, flushing state");
                    self.write_status();
                    let _ = write_retention(&self.retention_path, &self.graph);
                    return Ok(());
                }

                Some(completion) = rx.recv() => {
                    match completion {
                        Completion::Host(handle, result) => self.process_host_result(handle, result, &tx),
                        Completion::Service(handle, result) => self.process_service_result(handle, result, &tx),
                    }
                }

                _ = sighup.recv() => {
                    self.reload_config();
                }

                _ = &mut sleep => {
                    if let Some(event) = self.queue.pop_next() {
                        self.handle_event(event, &tx).await;
                    }
                }
            }
        }
    }

    /// Re-reads the configuration file on `SIGHUP` (spec.md §6 "reload").
    /// A validation failure leaves the running graph untouched and logs the
    /// reason, matching `ReloadError::Validation` rather than aborting the
    /// process. Object handles are positional, so a successful reload
    /// discards the old event queue and reseeds check placement and
    /// housekeeping cadences from scratch instead of trying to remap
    /// in-flight events onto a graph whose indices may have shifted.
    ///
    /// Runtime state (current state, attempt count, acknowledgements,
    /// downtime depth, notification counters, ...) for entities that exist
    /// in both generations is carried across via the same retention
    /// mechanism used at cold start (spec.md §4.7 step 6), not reset to
    /// `CheckableRuntime::default()` the way a brand-new `ObjectGraph` would
    /// otherwise leave it.
    fn reload_config(&mut self) {
        let raw = match load_from_file(&self.config_path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "reload: failed to read configuration, keeping running config");
                return;
            }
        };
        let (mut graph, diff) = match apply_config(Some(&self.graph), &raw) {
            Ok(result) => result,
            Err(errors) => {
                warn!(error = %errors, "reload: configuration invalid, keeping running config");
                return;
            }
        };
        info!(
            hosts_added = diff.hosts.added.len(),
            hosts_removed = diff.hosts.removed.len(),
            services_added = diff.services.added.len(),
            services_removed = diff.services.removed.len(),
            "reload: configuration applied"
        );

        if let Err(e) = write_retention(&self.retention_path, &self.graph) {
            warn!(error = %e, "reload: failed to snapshot runtime state, carried-over state may be lost");
        } else if let Err(e) = load_and_merge(&self.retention_path, &mut graph) {
            warn!(error = %e, "reload: failed to merge runtime state into the reloaded graph");
        }

        self.resources = ResourceTable::load(Path::new(&raw.main.resource_file)).unwrap_or_else(|e| {
            warn!(error = %e, "resource file unreadable, continuing with no $USERx$ macros");
            ResourceTable::default()
        });
        self.status_path = PathBuf::from(&raw.main.status_file);
        self.retention_path = PathBuf::from(&raw.main.retention_file);
        self.command_path = PathBuf::from(&raw.main.command_file);
        self.command_buffer = CommandBuffer::new(raw.main.external_command_buffer_slots);
        self.command_file_offset = 0;

        self.registry = graph.timeperiod_registry();
        self.graph = graph;

        let now = Utc::now();
        let mut queue = EventQueue::default();
        seed_check_events(&self.graph, &self.registry, now, &raw, &mut queue);
        seed_housekeeping_events(&raw, now, &mut queue);
        self.queue = queue;
        self.raw = raw;
    }

    async fn handle_event(&mut self, event: centinel_core::schedule::Event, tx: &mpsc::UnboundedSender<Completion>) {
        match event.kind {
            EventKind::HostCheck => {
                if let Some(EntityHandle::Host(handle)) = event.entity {
                    self.dispatch_host_check(handle, event.forced, tx);
                }
            }
            EventKind::ServiceCheck => {
                if let Some(EntityHandle::Service(handle)) = event.entity {
                    self.dispatch_service_check(handle, event.forced, tx);
                }
            }
            EventKind::Reaper => {
                debug!(in_flight_hosts = self.in_flight.host_checks_in_flight(), in_flight_services = self.in_flight.service_checks_in_flight(), "reaper tick");
                self.requeue_housekeeping(EventKind::Reaper, self.raw.main.check_reaper_interval_secs);
            }
            EventKind::RetentionSave => {
                if let Err(e) = write_retention(&self.retention_path, &self.graph) {
                    warn!(error = %e, "failed to write retention file");
                }
                self.requeue_housekeeping(EventKind::RetentionSave, self.raw.main.retention_update_interval_secs);
            }
            EventKind::StatusSave => {
                self.write_status();
                self.requeue_housekeeping(EventKind::StatusSave, self.raw.main.status_update_interval_secs);
            }
            EventKind::CommandFilePoll => {
                self.poll_command_file(tx);
                self.requeue_housekeeping(EventKind::CommandFilePoll, self.raw.main.command_check_interval_secs);
            }
            EventKind::HostFreshnessSweep => {
                self.sweep_host_freshness(tx);
                self.requeue_housekeeping(EventKind::HostFreshnessSweep, self.raw.main.host_freshness_check_interval_secs);
            }
            EventKind::ServiceFreshnessSweep => {
                self.sweep_service_freshness(tx);
                self.requeue_housekeeping(EventKind::ServiceFreshnessSweep, self.raw.main.service_freshness_check_interval_secs);
            }
            EventKind::OrphanSweep => {
                self.requeue_housekeeping(EventKind::OrphanSweep, self.raw.main.check_reaper_interval_secs * 6);
            }
            EventKind::AckExpire => {
                self.expire_acknowledgements();
                self.requeue_housekeeping(EventKind::AckExpire, 60);
            }
        }
    }

    fn requeue_housekeeping(&mut self, kind: EventKind, delay_secs: u64) {
        self.queue.schedule(NewEvent {
            kind,
            entity: None,
            run_time: Utc::now() + chrono::Duration::seconds(delay_secs.max(1) as i64),
            interval: Some(delay_secs as f64),
            compensate_for_time_change: true,
            forced: false,
        });
    }

    fn dispatch_host_check(&mut self, handle: HostHandle, forced: bool, tx: &mpsc::UnboundedSender<Completion>) {
        let Some(host) = self.graph.host(handle) else { return };
        if !forced && !host.runtime.checks_enabled {
            return;
        }
        self.in_flight.start_host_check();
        let command_line = self.build_check_command_line(EntityHandle::Host(handle));
        self.queue.schedule(NewEvent {
            kind: EventKind::HostCheck,
            entity: Some(EntityHandle::Host(handle)),
            run_time: Utc::now() + chrono::Duration::milliseconds((host.check_interval_secs * 1000.0) as i64),
            interval: Some(host.check_interval_secs),
            compensate_for_time_change: true,
            forced: false,
        });

        let tx = tx.clone();
        let timeout = Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECS);
        tokio::spawn(async move {
            let result = match command_line {
                Some(line) => run_check(&line, timeout).await,
                None => assumed_up_result(),
            };
            let _ = tx.send(Completion::Host(handle, result));
        });
    }

    fn dispatch_service_check(&mut self, handle: ServiceHandle, forced: bool, tx: &mpsc::UnboundedSender<Completion>) {
        let Some(service) = self.graph.service(handle) else { return };
        if !forced && !service.runtime.checks_enabled {
            return;
        }
        if !forced && !self.in_flight.try_start_service_check(self.raw.main.max_parallel_service_checks) {
            // Capacity reached: try again shortly rather than dropping the check.
            self.queue.schedule(NewEvent {
                kind: EventKind::ServiceCheck,
                entity: Some(EntityHandle::Service(handle)),
                run_time: Utc::now() + chrono::Duration::seconds(5),
                interval: Some(service.check_interval_secs),
                compensate_for_time_change: false,
                forced: false,
            });
            return;
        }
        let Some(command_line) = self.build_check_command_line(EntityHandle::Service(handle)) else {
            self.in_flight.finish_service_check();
            return;
        };
        self.queue.schedule(NewEvent {
            kind: EventKind::ServiceCheck,
            entity: Some(EntityHandle::Service(handle)),
            run_time: Utc::now() + chrono::Duration::milliseconds((service.check_interval_secs * 1000.0) as i64),
            interval: Some(service.check_interval_secs),
            compensate_for_time_change: true,
            forced: false,
        });

        let tx = tx.clone();
        let timeout = Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECS);
        tokio::spawn(async move {
            let result = run_check(&command_line, timeout).await;
            let _ = tx.send(Completion::Service(handle, result));
        });
    }

    /// Builds the shell command line for a check, expanding `$HOSTx$`/
    /// `$SERVICEx$`/`$USERx$` macros against the command template (spec.md
    /// §4.4, §6). `None` for a host with no `check_command` is the "assumed
    /// UP" shortcut.
    fn build_check_command_line(&self, entity: EntityHandle) -> Option<String> {
        let (command_handle, mut ctx) = match entity {
            EntityHandle::Host(h) => {
                let host = self.graph.host(h)?;
                let mut ctx = MacroContext::new();
                ctx.set("HOSTNAME", host.name.clone());
                ctx.set("HOSTALIAS", host.alias.clone());
                ctx.set("HOSTADDRESS", host.address.clone());
                (host.check_command, ctx)
            }
            EntityHandle::Service(h) => {
                let service = self.graph.service(h)?;
                let host = self.graph.host(service.host)?;
                let mut ctx = MacroContext::new();
                ctx.set("HOSTNAME", host.name.clone());
                ctx.set("HOSTADDRESS", host.address.clone());
                ctx.set("SERVICEDESC", service.description.clone());
                (Some(service.check_command), ctx)
            }
        };
        self.set_user_macros(&mut ctx);
        let command_handle = command_handle?;
        let command = self.graph.command(command_handle)?;
        Some(centinel_core::macros::expand_macros(&command.line, &ctx))
    }

    fn set_user_macros(&self, ctx: &mut MacroContext) {
        for i in 1..=centinel_config::resource::MAX_USER_MACROS {
            if let Some(value) = self.resources.get(i) {
                ctx.set(format!("USER{i}"), value.to_string());
            }
        }
    }

    fn process_host_result(&mut self, handle: HostHandle, result: DispatchedResult, tx: &mpsc::UnboundedSender<Completion>) {
        self.in_flight.finish_host_check();
        let now = Utc::now();
        let parsed = parse_plugin_output(&result.result.stdout);
        let new_state = coerce_active_host_state(result.result.exit_code, self.raw.main.use_aggressive_host_checking);

        let Some(host) = self.graph.host_mut(handle) else { return };
        host.runtime.plugin_output = parsed.short.clone();
        host.runtime.long_output = parsed.long.clone();
        host.runtime.perfdata = parsed.perfdata.clone();
        host.runtime.latency_secs = result.latency_secs;
        host.runtime.execution_time_secs = result.execution_time_secs;

        let max_attempts = host.max_attempts;
        let low = host.low_flap_threshold;
        let high = host.high_flap_threshold;
        let mut current = host.current_state;
        let mut last = host.last_state;
        let mut last_hard = host.last_hard_state;
        let outcome = apply_transition(
            &mut host.runtime,
            &mut current,
            &mut last,
            &mut last_hard,
            new_state,
            HostState::Up,
            max_attempts,
            low,
            high,
            &mut self.ids,
            now,
        );
        host.current_state = current;
        host.last_state = last;
        host.last_hard_state = last_hard;

        if host.process_perfdata {
            debug!(host = %host.name, perfdata = %parsed.perfdata, "host perfdata recorded");
        }

        self.maybe_notify_host(handle, outcome.reason, now, tx);
        let _ = tx;
    }

    fn process_service_result(&mut self, handle: ServiceHandle, result: DispatchedResult, tx: &mpsc::UnboundedSender<Completion>) {
        self.in_flight.finish_service_check();
        let now = Utc::now();
        let parsed = parse_plugin_output(&result.result.stdout);
        let new_state = coerce_service_state(result.result.exit_code);

        let Some(service) = self.graph.service_mut(handle) else { return };
        service.runtime.plugin_output = parsed.short.clone();
        service.runtime.long_output = parsed.long.clone();
        service.runtime.perfdata = parsed.perfdata.clone();
        service.runtime.latency_secs = result.latency_secs;
        service.runtime.execution_time_secs = result.execution_time_secs;

        let max_attempts = service.max_attempts;
        let low = service.low_flap_threshold;
        let high = service.high_flap_threshold;
        let mut current = service.current_state;
        let mut last = service.last_state;
        let mut last_hard = service.last_hard_state;
        let outcome = apply_transition(
            &mut service.runtime,
            &mut current,
            &mut last,
            &mut last_hard,
            new_state,
            ServiceState::Ok,
            max_attempts,
            low,
            high,
            &mut self.ids,
            now,
        );
        service.current_state = current;
        service.last_state = last;
        service.last_hard_state = last_hard;

        if service.process_perfdata {
            debug!(service = %service.description, perfdata = %parsed.perfdata, "service perfdata recorded");
        }

        self.maybe_notify_service(handle, outcome.reason, now, tx);
        let _ = tx;
    }

    fn maybe_notify_host(&mut self, handle: HostHandle, reason: NotificationReason, now: DateTime<Utc>, _tx: &mpsc::UnboundedSender<Completion>) {
        let reason = match reason {
            NotificationReason::Problem => Reason::Normal,
            NotificationReason::Recovery => Reason::Recovery,
            NotificationReason::None => return,
        };
        let Some(host) = self.graph.host(handle) else { return };
        if !self.raw.main.enable_notifications || !host.runtime.notifications_enabled {
            return;
        }
        let notification_period_valid_now = self.is_period_valid_now(host.notification_period, now);
        let current_bit = host_state_bit(host.current_state);
        let notify_mask_bit = host.notification_options.contains(host_notification_bit(host.current_state));
        let inputs = ViabilityInputs {
            global_notifications_enabled: self.raw.main.enable_notifications,
            entity_notifications_enabled: host.runtime.notifications_enabled,
            notification_period_valid_now,
            is_in_downtime: host.runtime.scheduled_downtime_depth > 0,
            is_flapping: host.runtime.flap.is_flapping,
            is_ok_state: host.current_state == HostState::Up,
            notify_on_current_state: notify_mask_bit,
            notify_on_flapping: host.notification_options.contains(centinel_core::object_graph::HostNotificationMask::FLAPPING),
            notify_on_downtime: host.notification_options.contains(centinel_core::object_graph::HostNotificationMask::DOWNTIME),
            first_notification_delay_secs: host.first_notification_delay_secs,
            recovery_notification_delay_secs: host.recovery_notification_delay_secs,
            notification_interval_secs: host.notification_interval_secs,
            now,
            runtime: &host.runtime,
            forced: false,
        };
        if !is_viable(reason, &inputs) {
            return;
        }

        let escalations: Vec<_> = host.escalations.iter().copied().collect();
        let own_contacts = host.contacts.clone();
        let own_groups = host.contact_groups.clone();
        let notification_number = host.runtime.notification.notification_number;
        let notification_interval_secs = host.notification_interval_secs;
        let host_name = host.name.clone();
        let host_address = host.address.clone();
        let plugin_output = host.runtime.plugin_output.clone();

        let query = RecipientQuery {
            graph: &self.graph,
            registry: &self.registry,
            escalations: &escalations,
            own_contacts: &own_contacts,
            own_contact_groups: &own_groups,
            notification_number,
            current_state_bit: current_bit,
            broadcast: false,
            now,
        };
        let recipients = resolve_recipients(&query);

        let mut sent = 0usize;
        for contact_handle in recipients {
            let Some(contact) = self.graph.contact(contact_handle) else { continue };
            let local_now = now.with_timezone(&Tz::UTC);
            if !contact_is_eligible(contact, true, &self.registry, local_now) {
                continue;
            }
            let Some(command_handle) = contact.host_notification_commands.first().copied() else { continue };
            let Some(command) = self.graph.command(command_handle) else { continue };
            let mut ctx = MacroContext::new();
            ctx.set("HOSTNAME", host_name.clone());
            ctx.set("HOSTADDRESS", host_address.clone());
            ctx.set("HOSTOUTPUT", plugin_output.clone());
            ctx.set("CONTACTEMAIL", contact.email.clone());
            self.set_user_macros(&mut ctx);
            let line = centinel_core::macros::expand_macros(&command.line, &ctx);
            spawn_notification(line);
            sent += 1;
        }

        if sent > 0 {
            if let Some(host) = self.graph.host_mut(handle) {
                host.runtime.notification.notification_number += 1;
                host.runtime.notification.last_notification = Some(now);
                host.runtime.notification.next_notification =
                    Some(now + chrono::Duration::milliseconds((notification_interval_secs * 1000.0) as i64));
            }
        }
    }

    fn maybe_notify_service(&mut self, handle: ServiceHandle, reason: NotificationReason, now: DateTime<Utc>, _tx: &mpsc::UnboundedSender<Completion>) {
        let reason = match reason {
            NotificationReason::Problem => Reason::Normal,
            NotificationReason::Recovery => Reason::Recovery,
            NotificationReason::None => return,
        };
        let Some(service) = self.graph.service(handle) else { return };
        if !self.raw.main.enable_notifications || !service.runtime.notifications_enabled {
            return;
        }
        let notification_period_valid_now = self.is_period_valid_now(service.notification_period, now);
        let current_bit = service_state_bit(service.current_state);
        let notify_mask_bit = service.notification_options.contains(service_notification_bit(service.current_state));
        let inputs = ViabilityInputs {
            global_notifications_enabled: self.raw.main.enable_notifications,
            entity_notifications_enabled: service.runtime.notifications_enabled,
            notification_period_valid_now,
            is_in_downtime: service.runtime.scheduled_downtime_depth > 0,
            is_flapping: service.runtime.flap.is_flapping,
            is_ok_state: service.current_state == ServiceState::Ok,
            notify_on_current_state: notify_mask_bit,
            notify_on_flapping: service.notification_options.contains(centinel_core::object_graph::ServiceNotificationMask::FLAPPING),
            notify_on_downtime: service.notification_options.contains(centinel_core::object_graph::ServiceNotificationMask::DOWNTIME),
            first_notification_delay_secs: service.first_notification_delay_secs,
            recovery_notification_delay_secs: service.recovery_notification_delay_secs,
            notification_interval_secs: service.notification_interval_secs,
            now,
            runtime: &service.runtime,
            forced: false,
        };
        if !is_viable(reason, &inputs) {
            return;
        }

        let escalations: Vec<_> = service.escalations.iter().copied().collect();
        let own_contacts = service.contacts.clone();
        let own_groups = service.contact_groups.clone();
        let notification_number = service.runtime.notification.notification_number;
        let notification_interval_secs = service.notification_interval_secs;
        let description = service.description.clone();
        let plugin_output = service.runtime.plugin_output.clone();
        let Some(host) = self.graph.host(service.host) else { return };
        let host_name = host.name.clone();
        let host_address = host.address.clone();

        let query = RecipientQuery {
            graph: &self.graph,
            registry: &self.registry,
            escalations: &escalations,
            own_contacts: &own_contacts,
            own_contact_groups: &own_groups,
            notification_number,
            current_state_bit: current_bit,
            broadcast: false,
            now,
        };
        let recipients = resolve_recipients(&query);

        let mut sent = 0usize;
        for contact_handle in recipients {
            let Some(contact) = self.graph.contact(contact_handle) else { continue };
            let local_now = now.with_timezone(&Tz::UTC);
            if !contact_is_eligible(contact, false, &self.registry, local_now) {
                continue;
            }
            let Some(command_handle) = contact.service_notification_commands.first().copied() else { continue };
            let Some(command) = self.graph.command(command_handle) else { continue };
            let mut ctx = MacroContext::new();
            ctx.set("HOSTNAME", host_name.clone());
            ctx.set("HOSTADDRESS", host_address.clone());
            ctx.set("SERVICEDESC", description.clone());
            ctx.set("SERVICEOUTPUT", plugin_output.clone());
            ctx.set("CONTACTEMAIL", contact.email.clone());
            self.set_user_macros(&mut ctx);
            let line = centinel_core::macros::expand_macros(&command.line, &ctx);
            spawn_notification(line);
            sent += 1;
        }

        if sent > 0 {
            if let Some(service) = self.graph.service_mut(handle) {
                service.runtime.notification.notification_number += 1;
                service.runtime.notification.last_notification = Some(now);
                service.runtime.notification.next_notification =
                    Some(now + chrono::Duration::milliseconds((notification_interval_secs * 1000.0) as i64));
            }
        }
    }

    fn is_period_valid_now(&self, tp_handle: centinel_core::handle::TimeperiodHandle, now: DateTime<Utc>) -> bool {
        let Some(tp) = self.registry.by_handle.get(&tp_handle) else {
            return false;
        };
        let exclusions = self.registry.exclusions_of(tp);
        timeperiod::is_valid(tp, &exclusions, now.with_timezone(&tp.timezone))
    }

    fn write_status(&self) {
        let now = Utc::now();
        let mut blocks = Vec::new();
        let mut info = Block::new("info");
        info.set("created", now.timestamp().to_string());
        blocks.push(info);

        let mut program = Block::new("programstatus");
        program.set("centinel_pid", std::process::id().to_string());
        program.set("last_command_check", now.timestamp().to_string());
        program.set("active_host_checks_enabled", "1");
        program.set("active_service_checks_enabled", "1");
        blocks.push(program);

        for (_, host) in self.graph.iter_hosts() {
            let mut block = Block::new("hoststatus");
            block.set("host_name", host.name.as_str());
            block.set("current_state", host_state_num(host.current_state).to_string());
            block.set("plugin_output", host.runtime.plugin_output.clone());
            block.set("long_plugin_output", host.runtime.long_output.clone());
            block.set("performance_data", host.runtime.perfdata.clone());
            block.set("last_check", host.runtime.last_check.map(|t| t.timestamp()).unwrap_or(0).to_string());
            block.set("current_attempt", host.runtime.current_attempt.to_string());
            block.set("is_flapping", (host.runtime.flap.is_flapping as i32).to_string());
            block.set("scheduled_downtime_depth", host.runtime.scheduled_downtime_depth.to_string());
            blocks.push(block);
        }
        for (_, service) in self.graph.iter_services() {
            let Some(host) = self.graph.host(service.host) else { continue };
            let mut block = Block::new("servicestatus");
            block.set("host_name", host.name.as_str());
            block.set("service_description", service.description.as_str());
            block.set("current_state", service_state_num(service.current_state).to_string());
            block.set("plugin_output", service.runtime.plugin_output.clone());
            block.set("long_plugin_output", service.runtime.long_output.clone());
            block.set("performance_data", service.runtime.perfdata.clone());
            block.set("last_check", service.runtime.last_check.map(|t| t.timestamp()).unwrap_or(0).to_string());
            block.set("current_attempt", service.runtime.current_attempt.to_string());
            block.set("is_flapping", (service.runtime.flap.is_flapping as i32).to_string());
            block.set("scheduled_downtime_depth", service.runtime.scheduled_downtime_depth.to_string());
            blocks.push(block);
        }

        if let Err(e) = write_blocks(&self.status_path, &blocks) {
            warn!(error = %e, "failed to write status file");
        }
    }

    /// Reads any bytes appended to the command file since the last poll,
    /// parses complete lines, and applies the subset of external commands
    /// this engine acts on (spec.md §6 "Command file").
    fn poll_command_file(&mut self, tx: &mpsc::UnboundedSender<Completion>) {
        if !self.raw.main.check_external_commands {
            return;
        }
        let Ok(mut file) = std::fs::File::open(&self.command_path) else {
            return;
        };
        let Ok(metadata) = file.metadata() else { return };
        if metadata.len() < self.command_file_offset {
            // File was truncated/rotated underneath us; restart from the top.
            self.command_file_offset = 0;
        }
        if file.seek(SeekFrom::Start(self.command_file_offset)).is_err() {
            return;
        }
        let mut buf = String::new();
        if file.read_to_string(&mut buf).is_err() {
            return;
        }
        self.command_file_offset = metadata.len();

        for line in buf.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command_line(line) {
                Ok(cmd) => {
                    if !self.command_buffer.push(cmd) {
                        warn!(dropped = self.command_buffer.dropped_count(), "command buffer full");
                    }
                }
                Err(e) => warn!(?e, line, "malformed external command"),
            }
        }

        for cmd in self.command_buffer.drain() {
            self.apply_external_command(cmd, tx);
        }
    }

    fn apply_external_command(&mut self, cmd: centinel_dispatch::ExternalCommand, tx: &mpsc::UnboundedSender<Completion>) {
        match cmd.name.as_str() {
            "SCHEDULE_FORCED_HOST_CHECK" | "SCHEDULE_HOST_CHECK" => {
                let forced = cmd.name == "SCHEDULE_FORCED_HOST_CHECK";
                if let Some(host_name) = cmd.args.first() {
                    if let Some(handle) = self.graph.find_host(host_name) {
                        self.queue.schedule(NewEvent {
                            kind: EventKind::HostCheck,
                            entity: Some(EntityHandle::Host(handle)),
                            run_time: Utc::now(),
                            interval: None,
                            compensate_for_time_change: false,
                            forced,
                        });
                    }
                }
            }
            "SCHEDULE_FORCED_SVC_CHECK" | "SCHEDULE_SVC_CHECK" => {
                let forced = cmd.name == "SCHEDULE_FORCED_SVC_CHECK";
                if let (Some(host_name), Some(desc)) = (cmd.args.first(), cmd.args.get(1)) {
                    if let Some(handle) = self.graph.find_service(host_name, desc) {
                        self.queue.schedule(NewEvent {
                            kind: EventKind::ServiceCheck,
                            entity: Some(EntityHandle::Service(handle)),
                            run_time: Utc::now(),
                            interval: None,
                            compensate_for_time_change: false,
                            forced,
                        });
                    }
                }
            }
            "PROCESS_HOST_CHECK_RESULT" => {
                if let (Some(host_name), Some(code_str)) = (cmd.args.first(), cmd.args.get(1)) {
                    if let (Some(handle), Ok(exit_code)) = (self.graph.find_host(host_name), code_str.parse::<i32>()) {
                        let stdout = cmd.args.get(2).cloned().unwrap_or_default();
                        let _ = tx.send(Completion::Host(handle, passive_result(exit_code, stdout)));
                    }
                }
            }
            "PROCESS_SERVICE_CHECK_RESULT" => {
                if let (Some(host_name), Some(desc), Some(code_str)) = (cmd.args.first(), cmd.args.get(1), cmd.args.get(2)) {
                    if let (Some(handle), Ok(exit_code)) = (self.graph.find_service(host_name, desc), code_str.parse::<i32>()) {
                        let stdout = cmd.args.get(3).cloned().unwrap_or_default();
                        let _ = tx.send(Completion::Service(handle, passive_result(exit_code, stdout)));
                    }
                }
            }
            "ENABLE_HOST_NOTIFICATIONS" => self.toggle_host_notifications(cmd.args.first(), true),
            "DISABLE_HOST_NOTIFICATIONS" => self.toggle_host_notifications(cmd.args.first(), false),
            "ENABLE_SVC_NOTIFICATIONS" => self.toggle_service_notifications(cmd.args.first(), cmd.args.get(1), true),
            "DISABLE_SVC_NOTIFICATIONS" => self.toggle_service_notifications(cmd.args.first(), cmd.args.get(1), false),
            "ACKNOWLEDGE_HOST_PROBLEM" => {
                if let Some(host_name) = cmd.args.first() {
                    if let Some(handle) = self.graph.find_host(host_name) {
                        let sticky = cmd.args.get(1).map(|s| s == "2").unwrap_or(false);
                        if let Some(host) = self.graph.host_mut(handle) {
                            host.runtime.acknowledgement = if sticky { AcknowledgementType::Sticky } else { AcknowledgementType::Normal };
                        }
                    }
                }
            }
            "ACKNOWLEDGE_SVC_PROBLEM" => {
                if let (Some(host_name), Some(desc)) = (cmd.args.first(), cmd.args.get(1)) {
                    if let Some(handle) = self.graph.find_service(host_name, desc) {
                        let sticky = cmd.args.get(2).map(|s| s == "2").unwrap_or(false);
                        if let Some(service) = self.graph.service_mut(handle) {
                            service.runtime.acknowledgement = if sticky { AcknowledgementType::Sticky } else { AcknowledgementType::Normal };
                        }
                    }
                }
            }
            other => debug!(command = other, "external command not handled by this engine"),
        }
    }

    fn toggle_host_notifications(&mut self, host_name: Option<&String>, enabled: bool) {
        if let Some(name) = host_name {
            if let Some(handle) = self.graph.find_host(name) {
                if let Some(host) = self.graph.host_mut(handle) {
                    host.runtime.notifications_enabled = enabled;
                }
            }
        }
    }

    fn toggle_service_notifications(&mut self, host_name: Option<&String>, desc: Option<&String>, enabled: bool) {
        if let (Some(host_name), Some(desc)) = (host_name, desc) {
            if let Some(handle) = self.graph.find_service(host_name, desc) {
                if let Some(service) = self.graph.service_mut(handle) {
                    service.runtime.notifications_enabled = enabled;
                }
            }
        }
    }

    /// Forces a check for any host whose last result is older than its
    /// freshness threshold (spec.md §6 "Freshness checking"). A zero
    /// threshold falls back to twice the configured check interval.
    fn sweep_host_freshness(&mut self, tx: &mpsc::UnboundedSender<Completion>) {
        let now = Utc::now();
        let stale: Vec<HostHandle> = self
            .graph
            .iter_hosts()
            .filter(|(_, h)| h.runtime.checks_enabled)
            .filter(|(_, h)| is_stale(h.runtime.last_check, freshness_threshold(h.freshness_threshold_secs, h.check_interval_secs), now))
            .map(|(h, _)| h)
            .collect();
        for handle in stale {
            if let Some(host) = self.graph.host(handle) {
                warn!(host = %host.name, "passive/active result stale, forcing a fresh check");
            }
            self.dispatch_host_check(handle, true, tx);
        }
    }

    fn sweep_service_freshness(&mut self, tx: &mpsc::UnboundedSender<Completion>) {
        let now = Utc::now();
        let stale: Vec<ServiceHandle> = self
            .graph
            .iter_services()
            .filter(|(_, s)| s.runtime.checks_enabled)
            .filter(|(_, s)| is_stale(s.runtime.last_check, freshness_threshold(s.freshness_threshold_secs, s.check_interval_secs), now))
            .map(|(h, _)| h)
            .collect();
        for handle in stale {
            if let Some(service) = self.graph.service(handle) {
                warn!(service = %service.description, "passive/active result stale, forcing a fresh check");
            }
            self.dispatch_service_check(handle, true, tx);
        }
    }

    fn expire_acknowledgements(&mut self) {
        let now = Utc::now();
        let expired_hosts: Vec<HostHandle> = self
            .graph
            .iter_hosts()
            .filter(|(_, h)| h.runtime.ack_expire_time.is_some_and(|t| now >= t))
            .map(|(h, _)| h)
            .collect();
        for handle in expired_hosts {
            if let Some(host) = self.graph.host_mut(handle) {
                host.runtime.acknowledgement = AcknowledgementType::None;
                host.runtime.ack_expire_time = None;
            }
        }
        let expired_services: Vec<ServiceHandle> = self
            .graph
            .iter_services()
            .filter(|(_, s)| s.runtime.ack_expire_time.is_some_and(|t| now >= t))
            .map(|(h, _)| h)
            .collect();
        for handle in expired_services {
            if let Some(service) = self.graph.service_mut(handle) {
                service.runtime.acknowledgement = AcknowledgementType::None;
                service.runtime.ack_expire_time = None;
            }
        }
    }
}

fn is_stale(last_check: Option<DateTime<Utc>>, threshold_secs: f64, now: DateTime<Utc>) -> bool {
    match last_check {
        None => false,
        Some(last) => (now - last).num_milliseconds() as f64 / 1000.0 > threshold_secs,
    }
}

fn freshness_threshold(configured_secs: u64, check_interval_secs: f64) -> f64 {
    if configured_secs > 0 {
        configured_secs as f64
    } else {
        check_interval_secs * 2.0
    }
}

fn assumed_up_result() -> DispatchedResult {
    use centinel_core::state::{ActiveOrPassive, CheckResult};
    let now = Utc::now();
    DispatchedResult {
        result: CheckResult {
            source: ActiveOrPassive::Active,
            start: now,
            end: now,
            exit_code: 0,
            early_timeout: false,
            exited_ok: true,
            stdout: "(Host assumed to be UP)".to_string(),
        },
        is_executed: false,
        latency_secs: 0.0,
        execution_time_secs: 0.0,
    }
}

fn passive_result(exit_code: i32, stdout: String) -> DispatchedResult {
    use centinel_core::state::{ActiveOrPassive, CheckResult};
    let now = Utc::now();
    DispatchedResult {
        result: CheckResult {
            source: ActiveOrPassive::Passive,
            start: now,
            end: now,
            exit_code,
            early_timeout: false,
            exited_ok: true,
            stdout,
        },
        is_executed: true,
        latency_secs: 0.0,
        execution_time_secs: 0.0,
    }
}

fn spawn_notification(command_line: String) {
    tokio::spawn(async move {
        let result = run_check(&command_line, Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECS)).await;
        if result.result.exit_code != 0 {
            warn!(exit_code = result.result.exit_code, "notification command exited non-zero");
        }
    });
}

fn host_state_num(state: HostState) -> u8 {
    match state {
        HostState::Up => 0,
        HostState::Down => 1,
        HostState::Unreachable => 2,
    }
}

fn service_state_num(state: ServiceState) -> u8 {
    match state {
        ServiceState::Ok => 0,
        ServiceState::Warning => 1,
        ServiceState::Critical => 2,
        ServiceState::Unknown => 3,
    }
}

/// Positions match `parse_fail_on_mask`'s shared table in the diff applier:
/// up=0, down=1, unreachable=2, ok=3, warning=4, unknown=5, critical=6.
fn host_state_bit(state: HostState) -> u8 {
    state_bit(match state {
        HostState::Up => 0,
        HostState::Down => 1,
        HostState::Unreachable => 2,
    })
}

fn service_state_bit(state: ServiceState) -> u8 {
    state_bit(match state {
        ServiceState::Ok => 3,
        ServiceState::Warning => 4,
        ServiceState::Unknown => 5,
        ServiceState::Critical => 6,
    })
}

fn host_notification_bit(state: HostState) -> centinel_core::object_graph::HostNotificationMask {
    use centinel_core::object_graph::HostNotificationMask as M;
    match state {
        HostState::Up => M::RECOVERY,
        HostState::Down => M::DOWN,
        HostState::Unreachable => M::UNREACHABLE,
    }
}

fn service_notification_bit(state: ServiceState) -> centinel_core::object_graph::ServiceNotificationMask {
    use centinel_core::object_graph::ServiceNotificationMask as M;
    match state {
        ServiceState::Ok => M::RECOVERY,
        ServiceState::Warning => M::WARNING,
        ServiceState::Unknown => M::UNKNOWN,
        ServiceState::Critical => M::CRITICAL,
    }
}

