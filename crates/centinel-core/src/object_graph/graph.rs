//! C2 — object graph.
//!
//! Owns every entity of one configuration generation. Handles are stable
//! for the lifetime of the generation that minted them; a reload swaps the
//! whole `ObjectGraph` for a new one rather than mutating topology in
//! place (design notes: "shared global mutable state" item).

use crate::handle::*;
use crate::object_graph::entities::*;
use crate::timeperiod::{Timeperiod, TimeperiodRegistry};
use hashbrown::HashMap;

#[derive(Default)]
pub struct ObjectGraph {
    pub generation: u64,

    hosts: Vec<Host>,
    services: Vec<Service>,
    contacts: Vec<Contact>,
    contactgroups: Vec<Contactgroup>,
    timeperiods: Vec<Timeperiod>,
    commands: Vec<Command>,
    dependencies: Vec<Dependency>,
    escalations: Vec<Escalation>,

    host_by_name: HashMap<String, HostHandle>,
    service_by_name: HashMap<(String, String), ServiceHandle>,
    contact_by_name: HashMap<String, ContactHandle>,
    contactgroup_by_name: HashMap<String, ContactgroupHandle>,
    timeperiod_by_name: HashMap<String, TimeperiodHandle>,
    command_by_name: HashMap<String, CommandHandle>,
}

macro_rules! accessors {
    ($field:ident, $handle:ty, $ty:ty, $get:ident, $get_mut:ident, $insert:ident, $iter:ident) => {
        pub fn $get(&self, h: $handle) -> Option<&$ty> {
            self.$field.get(h.index() as usize)
        }
        pub fn $get_mut(&mut self, h: $handle) -> Option<&mut $ty> {
            self.$field.get_mut(h.index() as usize)
        }
        pub fn $insert(&mut self, value: $ty) -> $handle {
            let handle = <$handle>::new(self.$field.len() as u32);
            self.$field.push(value);
            handle
        }
        pub fn $iter(&self) -> impl Iterator<Item = ($handle, &$ty)> {
            self.$field
                .iter()
                .enumerate()
                .map(|(i, v)| (<$handle>::new(i as u32), v))
        }
    };
}

impl ObjectGraph {
    accessors!(hosts, HostHandle, Host, host, host_mut, push_host, iter_hosts);
    accessors!(
        services,
        ServiceHandle,
        Service,
        service,
        service_mut,
        push_service,
        iter_services
    );
    accessors!(
        contacts,
        ContactHandle,
        Contact,
        contact,
        contact_mut,
        push_contact,
        iter_contacts
    );
    accessors!(
        contactgroups,
        ContactgroupHandle,
        Contactgroup,
        contactgroup,
        contactgroup_mut,
        push_contactgroup,
        iter_contactgroups
    );
    accessors!(
        commands,
        CommandHandle,
        Command,
        command,
        command_mut,
        push_command,
        iter_commands
    );
    accessors!(
        dependencies,
        DependencyHandle,
        Dependency,
        dependency,
        dependency_mut,
        push_dependency,
        iter_dependencies
    );
    accessors!(
        escalations,
        EscalationHandle,
        Escalation,
        escalation,
        escalation_mut,
        push_escalation,
        iter_escalations
    );

    pub fn timeperiod(&self, h: TimeperiodHandle) -> Option<&Timeperiod> {
        self.timeperiods.get(h.index() as usize)
    }
    pub fn timeperiod_mut(&mut self, h: TimeperiodHandle) -> Option<&mut Timeperiod> {
        self.timeperiods.get_mut(h.index() as usize)
    }
    pub fn push_timeperiod(&mut self, value: Timeperiod) -> TimeperiodHandle {
        let handle = TimeperiodHandle::new(self.timeperiods.len() as u32);
        self.timeperiods.push(value);
        handle
    }
    pub fn iter_timeperiods(&self) -> impl Iterator<Item = (TimeperiodHandle, &Timeperiod)> {
        self.timeperiods
            .iter()
            .enumerate()
            .map(|(i, v)| (TimeperiodHandle::new(i as u32), v))
    }
    pub fn timeperiod_registry(&self) -> TimeperiodRegistry {
        TimeperiodRegistry {
            by_handle: self
                .timeperiods
                .iter()
                .enumerate()
                .map(|(i, tp)| (TimeperiodHandle::new(i as u32), tp.clone()))
                .collect(),
        }
    }

    pub fn find_host(&self, name: &str) -> Option<HostHandle> {
        self.host_by_name.get(name).copied()
    }
    pub fn find_service(&self, host: &str, description: &str) -> Option<ServiceHandle> {
        self.service_by_name
            .get(&(host.to_string(), description.to_string()))
            .copied()
    }
    pub fn find_contact(&self, name: &str) -> Option<ContactHandle> {
        self.contact_by_name.get(name).copied()
    }
    pub fn find_contactgroup(&self, name: &str) -> Option<ContactgroupHandle> {
        self.contactgroup_by_name.get(name).copied()
    }
    pub fn find_timeperiod(&self, name: &str) -> Option<TimeperiodHandle> {
        self.timeperiod_by_name.get(name).copied()
    }
    pub fn find_command(&self, name: &str) -> Option<CommandHandle> {
        self.command_by_name.get(name).copied()
    }

    pub fn index_host(&mut self, name: String, handle: HostHandle) {
        self.host_by_name.insert(name, handle);
    }
    pub fn index_service(&mut self, host: String, description: String, handle: ServiceHandle) {
        self.service_by_name.insert((host, description), handle);
    }
    pub fn index_contact(&mut self, name: String, handle: ContactHandle) {
        self.contact_by_name.insert(name, handle);
    }
    pub fn index_contactgroup(&mut self, name: String, handle: ContactgroupHandle) {
        self.contactgroup_by_name.insert(name, handle);
    }
    pub fn index_timeperiod(&mut self, name: String, handle: TimeperiodHandle) {
        self.timeperiod_by_name.insert(name, handle);
    }
    pub fn index_command(&mut self, name: String, handle: CommandHandle) {
        self.command_by_name.insert(name, handle);
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Textual dump for crash-time diagnostics and tests. Order-independent
    /// for unordered members: names within each section are sorted.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut host_names: Vec<&str> = self.hosts.iter().map(|h| h.name.as_str()).collect();
        host_names.sort_unstable();
        out.push_str("hosts:\n");
        for name in host_names {
            out.push_str("  ");
            out.push_str(name);
            out.push('\n');
        }
        let mut service_keys: Vec<(String, String)> = self
            .services
            .iter()
            .map(|s| {
                let host_name = self
                    .hosts
                    .get(s.host.index() as usize)
                    .map(|h| h.name.as_str())
                    .unwrap_or("?");
                (host_name.to_string(), s.description.clone())
            })
            .collect();
        service_keys.sort_unstable();
        out.push_str("services:\n");
        for (host, desc) in service_keys {
            out.push_str(&format!("  {host}/{desc}\n"));
        }
        out
    }
}
