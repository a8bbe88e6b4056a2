use crate::error::Result;
use centinel_dispatch::status_file::parse_blocks;
use std::path::Path;

/// Prints a summary of the last-written status file: overall counts plus
/// any host/service currently in a non-OK state.
pub fn execute(status_file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(status_file)?;
    let blocks = parse_blocks(&contents);

    let mut host_count = 0usize;
    let mut service_count = 0usize;
    let mut problems = Vec::new();

    for block in &blocks {
        match block.header.as_str() {
            "hoststatus" => {
                host_count += 1;
                if block.fields.get("current_state").map(String::as_str) != Some("0") {
                    if let Some(name) = block.fields.get("host_name") {
                        problems.push(format!("host {name}"));
                    }
                }
            }
            "servicestatus" => {
                service_count += 1;
                if block.fields.get("current_state").map(String::as_str) != Some("0") {
                    if let (Some(host), Some(desc)) =
                        (block.fields.get("host_name"), block.fields.get("service_description"))
                    {
                        problems.push(format!("service {host}/{desc}"));
                    }
                }
            }
            _ => {}
        }
    }

    println!("hosts:    {host_count}");
    println!("services: {service_count}");
    if problems.is_empty() {
        println!("no active problems");
    } else {
        println!("active problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
