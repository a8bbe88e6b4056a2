//! Resource file parsing: `$USERx$=value` declarations (spec.md §6).

use crate::error::{ConfigError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// `$USERx$` with x in [1, MAX_USER_MACROS] is the only recognised form.
pub const MAX_USER_MACROS: u32 = 256;

#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    values: BTreeMap<u32, String>,
}

impl ResourceTable {
    pub fn get(&self, index: u32) -> Option<&str> {
        self.values.get(&index).map(|s| s.as_str())
    }

    pub fn set(&mut self, index: u32, value: String) -> Result<()> {
        if index == 0 || index > MAX_USER_MACROS {
            return Err(ConfigError::ResourceIndexOutOfRange(index));
        }
        self.values.insert(index, value);
        Ok(())
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        let mut table = Self::default();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::ResourceLine {
                    line: lineno + 1,
                    text: raw_line.to_string(),
                });
            };
            let key = key.trim();
            let Some(index) = parse_user_macro_name(key) else {
                return Err(ConfigError::ResourceLine {
                    line: lineno + 1,
                    text: raw_line.to_string(),
                });
            };
            table.set(index, value.trim().to_string())?;
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_str(&text)
    }
}

fn parse_user_macro_name(key: &str) -> Option<u32> {
    let inner = key.strip_prefix('$')?.strip_suffix('$')?;
    let digits = inner.strip_prefix("USER")?;
    digits.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_macros() {
        let table = ResourceTable::parse_str("$USER1$=/usr/lib/nagios/plugins\n$USER2$=hunter2\n")
            .unwrap();
        assert_eq!(table.get(1), Some("/usr/lib/nagios/plugins"));
        assert_eq!(table.get(2), Some("hunter2"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        let table = ResourceTable::parse_str("# comment\n\n$USER1$=x\n").unwrap();
        assert_eq!(table.get(1), Some("x"));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let err = ResourceTable::parse_str("$USER999$=x\n").unwrap_err();
        assert!(matches!(err, ConfigError::ResourceIndexOutOfRange(999)));
    }

    #[test]
    fn rejects_malformed_line() {
        let err = ResourceTable::parse_str("not a valid line\n").unwrap_err();
        assert!(matches!(err, ConfigError::ResourceLine { line: 1, .. }));
    }
}
