//! Config file loading and environment-variable overrides.
//!
//! Precedence is env > file > defaults.

use crate::error::{ConfigError, Result};
use crate::schema::RawConfig;
use std::path::Path;

pub fn load_from_file(path: &Path) -> Result<RawConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut config: RawConfig = toml::from_str(&text)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Overrides a handful of engine-wide keys from `CENTINEL_<KEY>` environment
/// variables. Object definitions (hosts/services/...) are never overridden
/// this way; only the scalar keys in `MainSection` are.
pub fn apply_env_overrides(config: &mut RawConfig) -> Result<()> {
    for (key, value) in std::env::vars() {
        let Some(setting) = key.strip_prefix("CENTINEL_") else {
            continue;
        };
        let setting = setting.to_lowercase();
        match setting.as_str() {
            "status_file" => config.main.status_file = value,
            "command_file" => config.main.command_file = value,
            "resource_file" => config.main.resource_file = value,
            "retention_file" => config.main.retention_file = value,
            "enable_notifications" => {
                config.main.enable_notifications = parse_bool(&key, &value)?
            }
            "enable_flap_detection" => {
                config.main.enable_flap_detection = parse_bool(&key, &value)?
            }
            "enable_event_handlers" => {
                config.main.enable_event_handlers = parse_bool(&key, &value)?
            }
            "check_external_commands" => {
                config.main.check_external_commands = parse_bool(&key, &value)?
            }
            "max_parallel_service_checks" => {
                config.main.max_parallel_service_checks = parse_num(&key, &value)?
            }
            "status_update_interval_secs" => {
                config.main.status_update_interval_secs = parse_num(&key, &value)?
            }
            "retention_update_interval_secs" => {
                config.main.retention_update_interval_secs = parse_num(&key, &value)?
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            key: key.to_string(),
            message: format!("not a boolean: {value}"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        message: format!("not a number: {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [main]
            status_file = "/tmp/status.dat"

            [timeperiod.24x7]
            alias = "24 Hours A Day, 7 Days A Week"
            ranges = [{{ range = "monday", start = "00:00", end = "24:00" }}]

            [host.web1]
            address = "10.0.0.1"
            check_period = "24x7"
            "#
        )
        .unwrap();
        let cfg = load_from_file(file.path()).unwrap();
        assert_eq!(cfg.main.status_file, "/tmp/status.dat");
        assert!(cfg.timeperiod.contains_key("24x7"));
        assert_eq!(cfg.host["web1"].address, "10.0.0.1");
    }

    #[test]
    fn env_override_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[main]\nstatus_file = \"/tmp/a.dat\"").unwrap();
        std::env::set_var("CENTINEL_STATUS_FILE", "/tmp/b.dat");
        let cfg = load_from_file(file.path()).unwrap();
        std::env::remove_var("CENTINEL_STATUS_FILE");
        assert_eq!(cfg.main.status_file, "/tmp/b.dat");
    }
}
