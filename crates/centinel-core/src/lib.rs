//! Check scheduler, per-entity state machine, and notification engine core.

pub mod error;
pub mod handle;
pub mod ids;
pub mod macros;
pub mod notify;
pub mod object_graph;
pub mod schedule;
pub mod state;
pub mod timeperiod;

pub use error::{GraphError, ReloadError, Result, ValidationErrors};
pub use handle::{
    CommandHandle, ContactHandle, ContactgroupHandle, DependencyHandle, EntityHandle,
    EscalationHandle, Handle, HostHandle, ServiceHandle, TimeperiodHandle,
};
pub use ids::IdSequences;
pub use object_graph::{apply_config, DiffResult, EntityDiff, ObjectGraph};
