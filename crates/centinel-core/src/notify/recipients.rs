//! C6 recipient resolution (spec.md §4.6 "Recipient resolution").

use crate::handle::{ContactHandle, EscalationHandle};
use crate::object_graph::{Contact, Escalation, ObjectGraph};
use crate::timeperiod::{self, TimeperiodRegistry};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;

/// `escalate_on` / `fail_on` bit positions shared across the crate: bit 0
/// maps to the entity's "ok-equivalent" state, the rest follow declaration
/// order of the relevant state enum.
pub fn state_bit(index: u8) -> u8 {
    1 << index
}

pub struct RecipientQuery<'a> {
    pub graph: &'a ObjectGraph,
    pub registry: &'a TimeperiodRegistry,
    pub escalations: &'a [EscalationHandle],
    pub own_contacts: &'a HashSet<ContactHandle>,
    pub own_contact_groups: &'a HashSet<crate::handle::ContactgroupHandle>,
    pub notification_number: u32,
    pub current_state_bit: u8,
    pub broadcast: bool,
    pub now: DateTime<Utc>,
}

/// Resolves the contact set for one notification: escalating entities take
/// the union of every matching escalation's recipients; non-escalating
/// entities (and BROADCAST, always) take the entity's own contacts and
/// contactgroups. The result is de-duplicated by contact handle.
pub fn resolve_recipients(query: &RecipientQuery) -> Vec<ContactHandle> {
    let mut set: HashSet<ContactHandle> = HashSet::new();

    let escalating = query
        .escalations
        .iter()
        .filter_map(|h| query.graph.escalation(*h))
        .any(|esc| escalation_matches(esc, query));

    if escalating {
        for handle in query.escalations {
            let Some(esc) = query.graph.escalation(*handle) else {
                continue;
            };
            if !escalation_matches(esc, query) {
                continue;
            }
            collect_contacts(query.graph, esc.contacts.iter().copied(), &esc.contact_groups, &mut set);
        }
    }
    if !escalating || query.broadcast {
        collect_contacts(query.graph, query.own_contacts.iter().copied(), query.own_contact_groups, &mut set);
    }

    set.into_iter().collect()
}

fn escalation_matches(esc: &Escalation, query: &RecipientQuery) -> bool {
    if query.notification_number < esc.first_notification || query.notification_number > esc.last_notification {
        return false;
    }
    if esc.escalate_on & query.current_state_bit == 0 {
        return false;
    }
    if let Some(tp_handle) = esc.timeperiod {
        let Some(tp) = query.registry.by_handle.get(&tp_handle) else {
            return false;
        };
        let exclusions = query.registry.exclusions_of(tp);
        let local = query.now.with_timezone(&tp.timezone);
        if !timeperiod::is_valid(tp, &exclusions, local) {
            return false;
        }
    }
    true
}

fn collect_contacts(
    graph: &ObjectGraph,
    direct: impl Iterator<Item = ContactHandle>,
    groups: &HashSet<crate::handle::ContactgroupHandle>,
    out: &mut HashSet<ContactHandle>,
) {
    out.extend(direct);
    for group_handle in groups {
        if let Some(group) = graph.contactgroup(*group_handle) {
            out.extend(group.members.iter().copied());
        }
    }
}

/// Per-contact filtering: drops a contact lacking the relevant notification
/// command, or whose own notification period is invalid right now.
pub fn contact_is_eligible(
    contact: &Contact,
    is_host_notification: bool,
    registry: &TimeperiodRegistry,
    now: DateTime<Tz>,
) -> bool {
    let has_command = if is_host_notification {
        !contact.host_notification_commands.is_empty()
    } else {
        !contact.service_notification_commands.is_empty()
    };
    if !has_command {
        return false;
    }
    let period = if is_host_notification {
        contact.host_notification_period
    } else {
        contact.service_notification_period
    };
    match period {
        None => true,
        Some(tp_handle) => match registry.by_handle.get(&tp_handle) {
            Some(tp) => {
                let exclusions = registry.exclusions_of(tp);
                timeperiod::is_valid(tp, &exclusions, now)
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::object_graph::Contact;
    use chrono::TimeZone;

    #[test]
    fn contact_without_command_is_ineligible() {
        let registry = TimeperiodRegistry {
            by_handle: Default::default(),
        };
        let contact = Contact::default();
        let now = Tz::UTC.from_utc_datetime(&chrono::NaiveDateTime::default());
        assert!(!contact_is_eligible(&contact, true, &registry, now));
    }

    #[test]
    fn contact_with_command_and_no_period_restriction_is_eligible() {
        let registry = TimeperiodRegistry {
            by_handle: Default::default(),
        };
        let mut contact = Contact::default();
        contact.host_notification_commands.push(Handle::new(0));
        let now = Tz::UTC.from_utc_datetime(&chrono::NaiveDateTime::default());
        assert!(contact_is_eligible(&contact, true, &registry, now));
    }
}
