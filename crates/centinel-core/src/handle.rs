//! Stable integer handles.
//!
//! Per the design notes' "linked-list entities with intrusive `next`
//! pointers" item: all cross-entity links become handles looked up through
//! the graph. A handle is only valid for the generation of the
//! [`crate::object_graph::ObjectGraph`] that minted it; handles never
//! outlive the graph generation that owns the entity they point to.

use std::hash::Hash;
use std::marker::PhantomData;

pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<T> Eq for Handle<T> {}
impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}
impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

pub struct HostMarker;
pub struct ServiceMarker;
pub struct ContactMarker;
pub struct ContactgroupMarker;
pub struct TimeperiodMarker;
pub struct CommandMarker;
pub struct DependencyMarker;
pub struct EscalationMarker;

pub type HostHandle = Handle<HostMarker>;
pub type ServiceHandle = Handle<ServiceMarker>;
pub type ContactHandle = Handle<ContactMarker>;
pub type ContactgroupHandle = Handle<ContactgroupMarker>;
pub type TimeperiodHandle = Handle<TimeperiodMarker>;
pub type CommandHandle = Handle<CommandMarker>;
pub type DependencyHandle = Handle<DependencyMarker>;
pub type EscalationHandle = Handle<EscalationMarker>;

/// Either a host or a service: most of C5/C6's logic is parameterised over
/// "the checkable entity", per the design-notes item collapsing the
/// `checkable -> notifier -> host/service` hierarchy into composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityHandle {
    Host(HostHandle),
    Service(ServiceHandle),
}
