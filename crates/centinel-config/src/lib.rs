//! Declarative configuration loading for the Centinel monitoring engine.
//!
//! This crate owns the *unresolved* configuration model: object definitions
//! keyed by name, engine-wide scalar settings, and the `$USERx$` resource
//! table. Name resolution into stable handles happens downstream in
//! `centinel_core::object_graph::diff`.

pub mod error;
pub mod loader;
pub mod resource;
pub mod schema;

pub use error::{ConfigError, Result};
pub use loader::{apply_env_overrides, load_from_file};
pub use resource::ResourceTable;
pub use schema::RawConfig;
