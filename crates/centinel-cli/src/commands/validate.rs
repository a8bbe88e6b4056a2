use crate::error::{CliError, Result};
use centinel_config::load_from_file;
use centinel_core::object_graph::apply_config;
use std::path::Path;
use tracing::info;

/// Parses and validates configuration without starting the event loop.
/// Prints a summary of what would change relative to a fresh load and
/// returns an error (non-zero exit) if validation fails.
pub fn execute(config: &Path) -> Result<()> {
    let raw = load_from_file(config)?;
    match apply_config(None, &raw) {
        Ok((graph, diff)) => {
            info!(
                hosts = graph.iter_hosts().count(),
                services = graph.iter_services().count(),
                contacts = graph.iter_contacts().count(),
                "configuration is valid"
            );
            println!("configuration OK");
            println!("  hosts:        {} added", diff.hosts.added.len());
            println!("  services:     {} added", diff.services.added.len());
            println!("  contacts:     {} added", diff.contacts.added.len());
            println!("  contactgroups:{} added", diff.contactgroups.added.len());
            println!("  timeperiods:  {} added", diff.timeperiods.added.len());
            println!("  commands:     {} added", diff.commands.added.len());
            Ok(())
        }
        Err(errors) => Err(CliError::Validation(errors)),
    }
}
