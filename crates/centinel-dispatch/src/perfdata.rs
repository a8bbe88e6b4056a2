//! Performance-data sinks (spec.md §6 "Performance-data sinks").
//!
//! Two backends per sink — file and pipe — both newline-terminated records
//! built by interpolating macros into a configured template. Writers are
//! serialised behind a single mutex per sink so the event loop never blocks
//! on one (spec.md §5); the file descriptor stays open across writes and is
//! only closed/reopened on reload.

use centinel_core::macros::{expand_macros, unescape_template, MacroContext};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::error::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    File,
    Pipe,
}

pub struct PerfdataSink {
    kind: SinkKind,
    path: PathBuf,
    template: String,
    handle: Mutex<Option<File>>,
}

impl PerfdataSink {
    pub fn new(kind: SinkKind, path: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            template: template.into(),
            handle: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<File, SinkError> {
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        if self.kind == SinkKind::Pipe {
            // Opened read-write nonblocking-equivalent so a write never
            // blocks waiting for a reader to attach to the FIFO.
            opts.read(true);
        }
        opts.open(&self.path).map_err(|e| SinkError::Io {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    /// Writes one result record, opening (and caching) the file handle on
    /// first use. Template escapes (`\n`, `\r`, `\t`) are translated before
    /// macro expansion so an escape sequence inside a macro value is left
    /// alone.
    pub fn write_record(&self, ctx: &MacroContext) -> Result<(), SinkError> {
        let expanded = expand_macros(&unescape_template(&self.template), ctx);
        let mut guard = self.handle.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        if let Some(file) = guard.as_mut() {
            writeln!(file, "{expanded}").map_err(|e| SinkError::Io {
                path: self.path.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Closes the cached handle; the next `write_record` reopens it. Used by
    /// a reload to atomically swap the descriptor.
    pub fn reopen(&self) {
        *self.handle.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expanded_template_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perfdata.log");
        let sink = PerfdataSink::new(SinkKind::File, &path, "$HOSTNAME$\\t$OUTPUT$");
        let mut ctx = MacroContext::new();
        ctx.set("HOSTNAME", "web1");
        ctx.set("OUTPUT", "OK");
        sink.write_record(&ctx).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "web1\tOK\n");
    }

    #[test]
    fn reopen_clears_cached_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perfdata.log");
        let sink = PerfdataSink::new(SinkKind::File, &path, "x");
        sink.write_record(&MacroContext::new()).unwrap();
        sink.reopen();
        assert!(sink.handle.lock().is_none());
    }
}
