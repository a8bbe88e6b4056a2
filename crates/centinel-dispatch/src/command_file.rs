//! Command file (FIFO) poller (spec.md §6 "Command file").
//!
//! Parses `[epoch] CMD_NAME;arg1;arg2;...` lines. A bounded ring buffer
//! tracks the high-water mark; over-buffer submissions are dropped and
//! counted rather than blocking the submitter.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingBracket,
    BadTimestamp,
    EmptyCommand,
}

/// Parses one command-file line. Lines failing to parse are logged by the
/// caller and discarded (spec.md §6); this function only classifies.
pub fn parse_command_line(line: &str) -> Result<ExternalCommand, ParseError> {
    let line = line.trim();
    let rest = line.strip_prefix('[').ok_or(ParseError::MissingBracket)?;
    let (epoch_str, rest) = rest.split_once(']').ok_or(ParseError::MissingBracket)?;
    let epoch: i64 = epoch_str.trim().parse().map_err(|_| ParseError::BadTimestamp)?;
    let timestamp = Utc.timestamp_opt(epoch, 0).single().ok_or(ParseError::BadTimestamp)?;

    let body = rest.trim_start();
    if body.is_empty() {
        return Err(ParseError::EmptyCommand);
    }
    let mut fields = body.split(';');
    let name = fields.next().unwrap_or("").trim().to_string();
    if name.is_empty() {
        return Err(ParseError::EmptyCommand);
    }
    let args = fields.map(|s| s.to_string()).collect();

    Ok(ExternalCommand { timestamp, name, args })
}

/// Bounded FIFO buffer for commands awaiting the loop thread's drain. A
/// submission past capacity is dropped and counted rather than displacing an
/// older, still-unprocessed command.
pub struct CommandBuffer {
    capacity: usize,
    queue: VecDeque<ExternalCommand>,
    high_water_mark: usize,
    dropped: u64,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::new(),
            high_water_mark: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, command: ExternalCommand) -> bool {
        if self.queue.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.queue.push_back(command);
        self.high_water_mark = self.high_water_mark.max(self.queue.len());
        true
    }

    pub fn drain(&mut self) -> Vec<ExternalCommand> {
        self.queue.drain(..).collect()
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let cmd = parse_command_line("[1700000000] SCHEDULE_HOST_CHECK;web1;1700000300").unwrap();
        assert_eq!(cmd.name, "SCHEDULE_HOST_CHECK");
        assert_eq!(cmd.args, vec!["web1", "1700000300"]);
    }

    #[test]
    fn rejects_missing_bracket() {
        assert_eq!(parse_command_line("1700000000] FOO").unwrap_err(), ParseError::MissingBracket);
    }

    #[test]
    fn rejects_non_numeric_timestamp() {
        assert_eq!(parse_command_line("[soon] FOO").unwrap_err(), ParseError::BadTimestamp);
    }

    #[test]
    fn rejects_empty_command_name() {
        assert_eq!(parse_command_line("[1700000000] ").unwrap_err(), ParseError::EmptyCommand);
    }

    #[test]
    fn over_capacity_submissions_are_dropped_and_counted() {
        let mut buf = CommandBuffer::new(2);
        let cmd = || ExternalCommand {
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            name: "NOOP".into(),
            args: vec![],
        };
        assert!(buf.push(cmd()));
        assert!(buf.push(cmd()));
        assert!(!buf.push(cmd()));
        assert_eq!(buf.dropped_count(), 1);
        assert_eq!(buf.high_water_mark(), 2);
    }
}
