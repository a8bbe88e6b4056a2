//! C5 — per-entity state machine (spec.md §4.5).
//!
//! Operates against the generic "checkable" shape (a current/last/last-hard
//! state plus a shared [`CheckableRuntime`]) rather than a class hierarchy,
//! per the design notes' composition item; hosts and services each get a
//! thin wrapper that extracts/injects the right fields.

use crate::ids::IdSequences;
use crate::object_graph::{AcknowledgementType, CheckableRuntime, HostState, ServiceState, StateType};
use crate::state::flap::{self, FlapTransition};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveOrPassive {
    Active,
    Passive,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub source: ActiveOrPassive,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub exit_code: i32,
    pub early_timeout: bool,
    pub exited_ok: bool,
    pub stdout: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub short: String,
    pub long: String,
    pub perfdata: String,
}

/// Splits plugin output on the well-known `|` delimiter into
/// (short, long, perfdata), and replaces semicolons with colons in the
/// short form (spec.md §4.5 "Filtering before ingestion").
pub fn parse_plugin_output(raw: &str) -> ParsedOutput {
    let mut lines = raw.splitn(2, '\n');
    let first_line = lines.next().unwrap_or("");
    let rest = lines.next().unwrap_or("");

    let (first_short, first_perf) = split_perfdata(first_line);
    let short = first_short.replace(';', ":");

    let mut long = String::new();
    let mut perfdata = first_perf;
    for line in rest.lines() {
        let (text, perf) = split_perfdata(line);
        if !long.is_empty() {
            long.push('\n');
        }
        long.push_str(text);
        if !perf.is_empty() {
            if !perfdata.is_empty() {
                perfdata.push(' ');
            }
            perfdata.push_str(&perf);
        }
    }

    ParsedOutput { short, long, perfdata }
}

fn split_perfdata(line: &str) -> (String, String) {
    match line.split_once('|') {
        Some((text, perf)) => (text.to_string(), perf.trim().to_string()),
        None => (line.to_string(), String::new()),
    }
}

/// Active-host coercion (spec.md §4.5): any non-OK exit is DOWN, OK exit is
/// UP; WARNING is coerced to UP unless aggressive host checking is enabled.
pub fn coerce_active_host_state(exit_code: i32, aggressive_host_checking: bool) -> HostState {
    match exit_code {
        0 => HostState::Up,
        1 if !aggressive_host_checking => HostState::Up,
        _ => HostState::Down,
    }
}

pub fn coerce_service_state(exit_code: i32) -> ServiceState {
    match exit_code {
        0 => ServiceState::Ok,
        1 => ServiceState::Warning,
        2 => ServiceState::Critical,
        _ => ServiceState::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationReason {
    None,
    Recovery,
    Problem,
}

pub struct TransitionOutcome {
    pub reason: NotificationReason,
    pub flap: FlapTransition,
    pub state_changed: bool,
    pub became_hard: bool,
}

/// Applies one result's worth of soft/hard attempt logic (spec.md §4.5
/// steps 1-6) to `runtime`, mutating `current_state`/`last_state`/
/// `last_hard_state` in place. `new_state_is_ok`/`new_state_is_equal` let
/// the caller stay generic over `HostState`/`ServiceState`.
pub fn apply_transition<S: Copy + PartialEq>(
    runtime: &mut CheckableRuntime,
    current_state: &mut S,
    last_state: &mut S,
    last_hard_state: &mut S,
    new_state: S,
    ok_state: S,
    max_attempts: u32,
    low_flap_threshold: f64,
    high_flap_threshold: f64,
    ids: &mut IdSequences,
    now: DateTime<Utc>,
) -> TransitionOutcome {
    let previous_state = *current_state;
    *last_state = previous_state;
    if runtime.state_type == StateType::Hard {
        *last_hard_state = previous_state;
    }

    let was_non_ok = previous_state != ok_state;
    let state_changed = new_state != previous_state;
    *current_state = new_state;

    let mut reason = NotificationReason::None;
    let mut became_hard = false;

    if new_state == ok_state {
        if was_non_ok {
            runtime.state_type = StateType::Hard;
            runtime.current_attempt = 1;
            runtime.last_hard_state_change = Some(now);
            // NORMAL clears on recovery; STICKY clears unconditionally on OK.
            // Both land here since this branch only runs when the new state
            // is the OK state.
            runtime.acknowledgement = AcknowledgementType::None;
            runtime.notification.notification_number = 0;
            runtime.notification.notified_on = 0;
            runtime.last_problem_id = runtime.current_problem_id;
            runtime.current_problem_id = 0;
            reason = NotificationReason::Recovery;
        }
    } else if runtime.current_attempt < max_attempts {
        runtime.state_type = StateType::Soft;
        runtime.current_attempt += 1;
    } else {
        if runtime.state_type != StateType::Hard {
            became_hard = true;
        }
        runtime.state_type = StateType::Hard;
        if became_hard {
            runtime.last_hard_state_change = Some(now);
            runtime.current_problem_id = ids.next_problem_id();
        }
        reason = NotificationReason::Problem;
    }

    runtime.last_event_id = runtime.current_event_id;
    runtime.current_event_id = ids.next_event_id();
    runtime.last_check = Some(now);
    if state_changed {
        runtime.last_state_change = Some(now);
    }

    let flap = if state_changed {
        let bucket = state_bucket(new_state, ok_state);
        flap::record_state(&mut runtime.flap, bucket, low_flap_threshold, high_flap_threshold)
    } else {
        FlapTransition::None
    };

    TransitionOutcome {
        reason,
        flap,
        state_changed,
        became_hard,
    }
}

fn state_bucket<S: Copy + PartialEq>(state: S, ok_state: S) -> u8 {
    if state == ok_state {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn first_non_ok_result_is_soft() {
        let mut runtime = CheckableRuntime::default();
        let mut ids = IdSequences::default();
        let mut current = HostState::Up;
        let mut last = HostState::Up;
        let mut last_hard = HostState::Up;
        let outcome = apply_transition(
            &mut runtime,
            &mut current,
            &mut last,
            &mut last_hard,
            HostState::Down,
            HostState::Up,
            3,
            25.0,
            50.0,
            &mut ids,
            now(),
        );
        assert_eq!(runtime.state_type, StateType::Soft);
        assert_eq!(outcome.reason, NotificationReason::None);
        assert_eq!(current, HostState::Down);
    }

    #[test]
    fn reaching_max_attempts_goes_hard_and_notifies_problem() {
        let mut runtime = CheckableRuntime::default();
        let mut ids = IdSequences::default();
        let mut current = HostState::Up;
        let mut last = HostState::Up;
        let mut last_hard = HostState::Up;
        for _ in 0..2 {
            apply_transition(
                &mut runtime, &mut current, &mut last, &mut last_hard,
                HostState::Down, HostState::Up, 3, 25.0, 50.0, &mut ids, now(),
            );
        }
        let outcome = apply_transition(
            &mut runtime, &mut current, &mut last, &mut last_hard,
            HostState::Down, HostState::Up, 3, 25.0, 50.0, &mut ids, now(),
        );
        assert_eq!(runtime.state_type, StateType::Hard);
        assert_eq!(outcome.reason, NotificationReason::Problem);
        assert!(runtime.current_problem_id > 0);
    }

    #[test]
    fn recovery_from_hard_problem_resets_attempt_and_notifies_recovery() {
        let mut runtime = CheckableRuntime::default();
        let mut ids = IdSequences::default();
        let mut current = HostState::Up;
        let mut last = HostState::Up;
        let mut last_hard = HostState::Up;
        for _ in 0..3 {
            apply_transition(
                &mut runtime, &mut current, &mut last, &mut last_hard,
                HostState::Down, HostState::Up, 3, 25.0, 50.0, &mut ids, now(),
            );
        }
        let outcome = apply_transition(
            &mut runtime, &mut current, &mut last, &mut last_hard,
            HostState::Up, HostState::Up, 3, 25.0, 50.0, &mut ids, now(),
        );
        assert_eq!(outcome.reason, NotificationReason::Recovery);
        assert_eq!(runtime.current_attempt, 1);
        assert_eq!(runtime.current_problem_id, 0);
        assert!(runtime.last_problem_id > 0);
    }

    #[test]
    fn plugin_output_splits_on_pipe_and_escapes_semicolons() {
        let parsed = parse_plugin_output("disk ok; 80% used|used=80%;90;95");
        assert_eq!(parsed.short, "disk ok: 80% used");
        assert_eq!(parsed.perfdata, "used=80%;90;95");
    }

    #[test]
    fn aggressive_host_checking_keeps_warning_as_down() {
        assert_eq!(coerce_active_host_state(1, false), HostState::Up);
        assert_eq!(coerce_active_host_state(1, true), HostState::Down);
    }
}
