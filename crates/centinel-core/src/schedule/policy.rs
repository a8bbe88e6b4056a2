//! C4 scheduling-parameter derivation and initial check placement (spec.md
//! §4.4). Pure functions over an [`ObjectGraph`] snapshot; the event-loop
//! crate owns re-arming the queue with the times these functions compute.

use crate::handle::{HostHandle, ServiceHandle};
use crate::object_graph::ObjectGraph;
use crate::timeperiod::{self, TimeperiodRegistry};
use centinel_config::schema::{InterCheckDelayMethod, InterleaveFactorMethod};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy)]
pub struct SchedulingParams {
    pub total_scheduled: usize,
    pub check_interval_total_secs: f64,
    pub inter_check_delay_secs: f64,
    pub interleave_factor: usize,
}

fn is_schedulable(
    checks_enabled: bool,
    check_interval_secs: f64,
    check_period: crate::handle::TimeperiodHandle,
    registry: &TimeperiodRegistry,
    now: DateTime<Tz>,
) -> bool {
    if !checks_enabled || check_interval_secs <= 0.0 {
        return false;
    }
    let Some(tp) = registry.by_handle.get(&check_period) else {
        return false;
    };
    let exclusions = registry.exclusions_of(tp);
    timeperiod::is_valid(tp, &exclusions, now) || timeperiod::next_valid(tp, &exclusions, now).is_some()
}

/// Derives `total_scheduled`, `check_interval_total`, the inter-check delay
/// (one of four policies), and the service interleave factor, for one
/// checkable population (hosts or services share the same formulas; callers
/// supply interval-length-scaled seconds already).
pub fn derive_params(
    schedulable_intervals_secs: &[f64],
    method: InterCheckDelayMethod,
    configured_delay_secs: f64,
    max_spread_minutes: u32,
    interleave_method: InterleaveFactorMethod,
    configured_interleave_factor: usize,
    services_per_host_avg: f64,
) -> SchedulingParams {
    let total_scheduled = schedulable_intervals_secs.len();
    let check_interval_total_secs: f64 = schedulable_intervals_secs.iter().sum();

    let inter_check_delay_secs = if total_scheduled == 0 {
        0.0
    } else {
        match method {
            InterCheckDelayMethod::None => 0.0,
            InterCheckDelayMethod::Dumb => 1.0,
            InterCheckDelayMethod::User => configured_delay_secs,
            InterCheckDelayMethod::Smart => {
                let avg_interval = check_interval_total_secs / total_scheduled as f64;
                let cap = (max_spread_minutes as f64 * 60.0) / total_scheduled as f64;
                avg_interval.min(cap)
            }
        }
    };

    let interleave_factor = match interleave_method {
        InterleaveFactorMethod::User => configured_interleave_factor.max(1),
        InterleaveFactorMethod::Smart => services_per_host_avg.ceil().max(1.0) as usize,
    };

    SchedulingParams {
        total_scheduled,
        check_interval_total_secs,
        inter_check_delay_secs,
        interleave_factor,
    }
}

pub struct HostPlacement {
    pub host: HostHandle,
    pub at: DateTime<Utc>,
}

/// Places hosts in sequence at multiples of the inter-check delay from
/// `now`, pushing any placement that lands outside its check-period forward
/// to the next valid instant.
pub fn place_hosts(
    graph: &ObjectGraph,
    registry: &TimeperiodRegistry,
    now: DateTime<Utc>,
    params: &SchedulingParams,
) -> Vec<HostPlacement> {
    let mut placements = Vec::new();
    let mut i = 0u32;
    for (handle, host) in graph.iter_hosts() {
        if !is_schedulable(
            host.runtime.checks_enabled,
            host.check_interval_secs,
            host.check_period,
            registry,
            now.with_timezone(&Tz::UTC),
        ) {
            continue;
        }
        let mut at = now + chrono::Duration::milliseconds((params.inter_check_delay_secs * 1000.0 * i as f64) as i64);
        if let Some(tp) = registry.by_handle.get(&host.check_period) {
            let exclusions = registry.exclusions_of(tp);
            let zoned = at.with_timezone(&tp.timezone);
            if !timeperiod::is_valid(tp, &exclusions, zoned) {
                if let Some(next) = timeperiod::next_valid(tp, &exclusions, zoned) {
                    at = next.with_timezone(&Utc);
                }
            }
        }
        placements.push(HostPlacement { host: handle, at });
        i += 1;
    }
    placements
}

pub struct ServicePlacement {
    pub service: ServiceHandle,
    pub at: DateTime<Utc>,
}

/// Interleave walk: the i-th scheduled service is placed at
/// `now + ((current_block) + (block_index · total_blocks)) · inter_check_delay`
/// per spec.md §4.4. `current_block` increments every `interleave_factor`
/// placements; `block_index` is the position within the current block.
pub fn place_services(
    graph: &ObjectGraph,
    registry: &TimeperiodRegistry,
    now: DateTime<Utc>,
    params: &SchedulingParams,
) -> Vec<ServicePlacement> {
    let schedulable: Vec<ServiceHandle> = graph
        .iter_services()
        .filter(|(_, svc)| {
            is_schedulable(
                svc.runtime.checks_enabled,
                svc.check_interval_secs,
                svc.check_period,
                registry,
                now.with_timezone(&Tz::UTC),
            )
        })
        .map(|(h, _)| h)
        .collect();

    let total_scheduled = schedulable.len();
    if total_scheduled == 0 {
        return Vec::new();
    }
    let interleave_factor = params.interleave_factor.max(1);
    let total_blocks = (total_scheduled as f64 / interleave_factor as f64).ceil() as usize;

    let mut placements = Vec::with_capacity(total_scheduled);
    for (i, handle) in schedulable.into_iter().enumerate() {
        let current_block = i % interleave_factor;
        let block_index = i / interleave_factor;
        let offset_units = current_block + block_index * total_blocks;
        let mut at = now
            + chrono::Duration::milliseconds((params.inter_check_delay_secs * 1000.0 * offset_units as f64) as i64);
        let Some(svc) = graph.service(handle) else {
            continue;
        };
        if let Some(tp) = registry.by_handle.get(&svc.check_period) {
            let exclusions = registry.exclusions_of(tp);
            let zoned = at.with_timezone(&tp.timezone);
            if !timeperiod::is_valid(tp, &exclusions, zoned) {
                if let Some(next) = timeperiod::next_valid(tp, &exclusions, zoned) {
                    at = next.with_timezone(&Utc);
                }
            }
        }
        placements.push(ServicePlacement { service: handle, at });
    }
    placements
}

/// spec.md §4.4 "Rescheduling on failure to launch": pushes the next check
/// out by `max(check_interval, 5 min)`, snaps to the check-period's next
/// valid instant, and defers a further week (with the caller expected to
/// log a warning) if no valid instant exists within that week.
pub fn reschedule_after_failed_launch(
    check_interval_secs: f64,
    check_period_tp: &crate::timeperiod::Timeperiod,
    exclusions: &[&crate::timeperiod::Timeperiod],
    now: DateTime<Tz>,
) -> DateTime<Tz> {
    const FIVE_MINUTES_SECS: f64 = 300.0;
    let delay = check_interval_secs.max(FIVE_MINUTES_SECS);
    let candidate = now + chrono::Duration::milliseconds((delay * 1000.0) as i64);
    match timeperiod::next_valid(check_period_tp, exclusions, candidate) {
        Some(t) => t,
        None => candidate + chrono::Duration::weeks(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_delay_is_capped_by_max_spread() {
        let intervals = vec![60.0; 1000];
        let params = derive_params(
            &intervals,
            InterCheckDelayMethod::Smart,
            0.0,
            30,
            InterleaveFactorMethod::Smart,
            1,
            1.0,
        );
        let cap = (30.0 * 60.0) / 1000.0;
        assert!(params.inter_check_delay_secs <= cap + f64::EPSILON);
    }

    #[test]
    fn none_method_yields_zero_delay() {
        let params = derive_params(
            &[60.0, 60.0],
            InterCheckDelayMethod::None,
            5.0,
            30,
            InterleaveFactorMethod::User,
            2,
            2.0,
        );
        assert_eq!(params.inter_check_delay_secs, 0.0);
    }

    #[test]
    fn smart_interleave_rounds_up_average() {
        let params = derive_params(
            &[60.0],
            InterCheckDelayMethod::Dumb,
            0.0,
            30,
            InterleaveFactorMethod::Smart,
            1,
            2.3,
        );
        assert_eq!(params.interleave_factor, 3);
    }
}
