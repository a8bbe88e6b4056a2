//! C3 — event queue.
//!
//! Two priority bands (high for operational bookkeeping, low for checks and
//! acknowledgement expiry) so the reaper/retention/status housekeeping never
//! starves behind a backlog of check events. Ordering within a band is by
//! `run_time`, then by insertion sequence — a `BinaryHeap` alone cannot
//! express the "then enqueue order" tiebreak, so every event carries a
//! monotonically increasing `seq` assigned at `schedule` time.

use crate::handle::EntityHandle;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Reaper,
    RetentionSave,
    StatusSave,
    CommandFilePoll,
    HostFreshnessSweep,
    ServiceFreshnessSweep,
    OrphanSweep,
    HostCheck,
    ServiceCheck,
    AckExpire,
}

impl EventKind {
    pub fn priority(self) -> Priority {
        match self {
            EventKind::HostCheck | EventKind::ServiceCheck | EventKind::AckExpire => Priority::Low,
            _ => Priority::High,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub entity: Option<EntityHandle>,
    pub run_time: DateTime<Utc>,
    pub interval: Option<f64>,
    pub compensate_for_time_change: bool,
    pub forced: bool,
    seq: u64,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.run_time == other.run_time && self.seq == other.seq
    }
}
impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest run_time, then
        // earliest seq, pops first.
        other
            .run_time
            .cmp(&self.run_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct EventQueue {
    high: BinaryHeap<Event>,
    low: BinaryHeap<Event>,
    next_seq: u64,
}

pub struct NewEvent {
    pub kind: EventKind,
    pub entity: Option<EntityHandle>,
    pub run_time: DateTime<Utc>,
    pub interval: Option<f64>,
    pub compensate_for_time_change: bool,
    pub forced: bool,
}

impl EventQueue {
    /// Enqueues a new event, applying the collision policy (spec.md §4.4)
    /// against any already-queued event of the same kind/entity: the forced
    /// event wins; if both or neither are forced, the earlier time wins.
    pub fn schedule(&mut self, new: NewEvent) {
        if let Some(existing_entity) = new.entity {
            if let Some(existing) = self.find(new.kind, existing_entity) {
                let keep_new = match (new.forced, existing.forced) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => new.run_time < existing.run_time,
                };
                if !keep_new {
                    return;
                }
                self.remove(new.kind, existing_entity);
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let event = Event {
            kind: new.kind,
            entity: new.entity,
            run_time: new.run_time,
            interval: new.interval,
            compensate_for_time_change: new.compensate_for_time_change,
            forced: new.forced,
            seq,
        };
        match new.kind.priority() {
            Priority::High => self.high.push(event),
            Priority::Low => self.low.push(event),
        }
    }

    pub fn find(&self, kind: EventKind, entity: EntityHandle) -> Option<&Event> {
        let heap = match kind.priority() {
            Priority::High => &self.high,
            Priority::Low => &self.low,
        };
        heap.iter().find(|e| e.kind == kind && e.entity == Some(entity))
    }

    /// Removing an event does not cancel an in-flight check launched from
    /// it; it only prevents a further dispatch until that check completes.
    pub fn remove(&mut self, kind: EventKind, entity: EntityHandle) -> bool {
        let heap = match kind.priority() {
            Priority::High => &mut self.high,
            Priority::Low => &mut self.low,
        };
        let before = heap.len();
        let retained: Vec<Event> = heap
            .drain()
            .filter(|e| !(e.kind == kind && e.entity == Some(entity)))
            .collect();
        let removed = retained.len() != before;
        *heap = retained.into_iter().collect();
        removed
    }

    pub fn reschedule(&mut self, kind: EventKind, entity: EntityHandle, new_time: DateTime<Utc>) {
        if let Some(existing) = self.find(kind, entity).cloned() {
            self.remove(kind, entity);
            self.schedule(NewEvent {
                kind,
                entity: Some(entity),
                run_time: new_time,
                interval: existing.interval,
                compensate_for_time_change: existing.compensate_for_time_change,
                forced: existing.forced,
            });
        }
    }

    /// Pops the next-due event across both bands: high-priority events are
    /// drained ahead of any low-priority event with the same or later
    /// `run_time`, but a low event due strictly before the next high event
    /// still runs first — both heaps are peeked and the earlier wins.
    pub fn pop_next(&mut self) -> Option<Event> {
        match (self.high.peek(), self.low.peek()) {
            (Some(h), Some(l)) => {
                if h.run_time <= l.run_time {
                    self.high.pop()
                } else {
                    self.low.pop()
                }
            }
            (Some(_), None) => self.high.pop(),
            (None, Some(_)) => self.low.pop(),
            (None, None) => None,
        }
    }

    pub fn peek_next_run_time(&self) -> Option<DateTime<Utc>> {
        let h = self.high.peek().map(|e| e.run_time);
        let l = self.low.peek().map(|e| e.run_time);
        match (h, l) {
            (Some(h), Some(l)) => Some(h.min(l)),
            (Some(h), None) => Some(h),
            (None, Some(l)) => Some(l),
            (None, None) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Handle, HostMarker};
    use chrono::TimeZone;

    fn host(n: u32) -> EntityHandle {
        EntityHandle::Host(Handle::<HostMarker>::new(n))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn new_event(kind: EventKind, entity: EntityHandle, run_time: DateTime<Utc>, forced: bool) -> NewEvent {
        NewEvent {
            kind,
            entity: Some(entity),
            run_time,
            interval: None,
            compensate_for_time_change: false,
            forced,
        }
    }

    #[test]
    fn pops_in_run_time_order_within_a_band() {
        let mut q = EventQueue::default();
        q.schedule(new_event(EventKind::HostCheck, host(1), at(20), false));
        q.schedule(new_event(EventKind::HostCheck, host(2), at(10), false));
        let first = q.pop_next().unwrap();
        assert_eq!(first.entity, Some(host(2)));
    }

    #[test]
    fn forced_event_beats_unforced_collision() {
        let mut q = EventQueue::default();
        q.schedule(new_event(EventKind::HostCheck, host(1), at(100), false));
        q.schedule(new_event(EventKind::HostCheck, host(1), at(50), true));
        let e = q.pop_next().unwrap();
        assert_eq!(e.run_time, at(50));
        assert!(e.forced);
        assert!(q.is_empty());
    }

    #[test]
    fn unforced_collision_keeps_earlier_time() {
        let mut q = EventQueue::default();
        q.schedule(new_event(EventKind::HostCheck, host(1), at(50), false));
        q.schedule(new_event(EventKind::HostCheck, host(1), at(100), false));
        let e = q.pop_next().unwrap();
        assert_eq!(e.run_time, at(50));
        assert!(q.is_empty());
    }

    #[test]
    fn high_priority_preempts_later_low_priority() {
        let mut q = EventQueue::default();
        q.schedule(new_event(EventKind::HostCheck, host(1), at(10), false));
        q.schedule(NewEvent {
            kind: EventKind::Reaper,
            entity: None,
            run_time: at(10),
            interval: Some(10.0),
            compensate_for_time_change: true,
            forced: false,
        });
        let first = q.pop_next().unwrap();
        assert_eq!(first.kind, EventKind::Reaper);
    }
}
