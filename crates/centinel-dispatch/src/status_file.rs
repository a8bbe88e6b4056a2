//! Status and retention file writers (spec.md §6 "Status file", "Retention
//! file"). Both share the same newline-delimited `key=value` block shape;
//! the writer always goes through a temp-file-then-rename so a reader never
//! observes a partial write.

use crate::error::PersistenceError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

pub struct Block {
    pub header: String,
    pub fields: BTreeMap<String, String>,
}

impl Block {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Renders blocks in the `header {\n key=value\n }\n` shape the stats
/// reader expects, and writes them atomically via a temp-file rename.
pub fn write_blocks(path: &Path, blocks: &[Block]) -> Result<(), PersistenceError> {
    let mut out = String::new();
    for block in blocks {
        out.push_str(&block.header);
        out.push_str(" {\n");
        for (key, value) in &block.fields {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out.push_str("}\n");
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path).map_err(|e| PersistenceError::Io {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        tmp.write_all(out.as_bytes()).map_err(|e| PersistenceError::Io {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        tmp.sync_all().map_err(|e| PersistenceError::Io {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| PersistenceError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Parses blocks back out of a status/retention file's textual form.
/// Tolerant of a partially written final block (the writer always replaces
/// the whole file via rename, but a reader may still catch an older
/// complete file mid-read on some filesystems).
pub fn parse_blocks(contents: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    for line in contents.lines() {
        let line = line.trim();
        if let Some(header) = line.strip_suffix('{').map(|s| s.trim()) {
            current = Some(Block::new(header));
        } else if line == "}" {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
        } else if let Some((key, value)) = line.split_once('=') {
            if let Some(block) = current.as_mut() {
                block.set(key, value);
            }
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_write_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.dat");
        let mut info = Block::new("info");
        info.set("created", "1700000000");
        let mut host = Block::new("hoststatus");
        host.set("host_name", "web1").set("current_state", "0");
        write_blocks(&path, &[info, host]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let blocks = parse_blocks(&contents);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].header, "info");
        assert_eq!(blocks[1].fields.get("host_name"), Some(&"web1".to_string()));
    }

    #[test]
    fn write_never_leaves_a_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.dat");
        write_blocks(&path, &[Block::new("info")]).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert!(path.exists());
    }
}
