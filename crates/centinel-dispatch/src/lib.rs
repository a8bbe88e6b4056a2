//! Check subprocess execution, perfdata sinks, and external-interface
//! pollers (spec.md §4.4, §6).
//!
//! `centinel-core` decides *what* should happen next (scheduling, state
//! transitions, notification viability); this crate carries those decisions
//! out against the operating system and the filesystem.

pub mod checker;
pub mod command_file;
pub mod error;
pub mod perfdata;
pub mod retention;
pub mod status_file;

pub use checker::{run_check, DispatchedResult, InFlightTracker};
pub use command_file::{CommandBuffer, ExternalCommand, ParseError};
pub use error::{CommandFileError, DispatchError, PersistenceError, Result, SinkError};
pub use perfdata::{PerfdataSink, SinkKind};
pub use retention::{load_and_merge, write_retention};
pub use status_file::{parse_blocks, write_blocks, Block};
