//! Global sequence counters.
//!
//! Per spec.md §5 "Global counters are sequences assigned only on the loop
//! thread" — these are plain fields of the engine value, never free
//! globals/statics, per the design notes' "shared global mutable state"
//! item.

#[derive(Debug, Default, Clone, Copy)]
pub struct IdSequences {
    next_event_id: u64,
    next_problem_id: u64,
    next_notification_id: u64,
    next_comment_id: u64,
    next_downtime_id: u64,
}

impl IdSequences {
    pub fn next_event_id(&mut self) -> u64 {
        self.next_event_id += 1;
        self.next_event_id
    }

    pub fn next_problem_id(&mut self) -> u64 {
        self.next_problem_id += 1;
        self.next_problem_id
    }

    pub fn next_notification_id(&mut self) -> u64 {
        self.next_notification_id += 1;
        self.next_notification_id
    }

    pub fn next_comment_id(&mut self) -> u64 {
        self.next_comment_id += 1;
        self.next_comment_id
    }

    pub fn next_downtime_id(&mut self) -> u64 {
        self.next_downtime_id += 1;
        self.next_downtime_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_strictly_increase() {
        let mut ids = IdSequences::default();
        let a = ids.next_event_id();
        let b = ids.next_event_id();
        assert!(b > a);
        let p1 = ids.next_problem_id();
        let p2 = ids.next_problem_id();
        assert!(p2 > p1);
    }
}
