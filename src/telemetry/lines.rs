// src/telemetry/lines.rs

//! Turning the runtime's raw output bytes into classified lines.

use crate::telemetry::{LogLevel, LogSource, OutputStream};

/// Accumulates bytes for one output stream and yields complete lines.
///
/// Both `\n` and `\r` end a line so carriage-return progress updates are
/// seen as separate lines. Empty lines are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if !self.buffer.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.buffer).into_owned());
                    self.buffer.clear();
                }
            } else {
                self.buffer.push(byte);
            }
        }
        lines
    }

    /// Emit whatever is left without a terminator.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(line)
    }
}

/// Severity of a line. Anything on stderr is an error.
pub fn classify(line: &str, stream: OutputStream) -> LogLevel {
    if stream == OutputStream::Stderr {
        return LogLevel::Error;
    }
    if line.contains("[download]") && line.contains('%') {
        return LogLevel::Progress;
    }
    if line.contains("ERROR") || line.contains("Error") {
        return LogLevel::Error;
    }
    if line.contains("WARNING") || line.contains("Warning") {
        return LogLevel::Warning;
    }
    if line.contains("[debug]") || line.starts_with("DEBUG") {
        return LogLevel::Debug;
    }
    LogLevel::Info
}

/// Lines tagged `[component]` come from the extraction program itself.
pub fn origin(line: &str, stream: OutputStream) -> LogSource {
    if line.contains('[') {
        return LogSource::Extractor;
    }
    match stream {
        OutputStream::Stdout => LogSource::Stdout,
        OutputStream::Stderr => LogSource::Stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_both_terminators_and_skips_empties() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"one\r\ntwo\n\nthr");
        assert_eq!(lines, vec!["one", "two"]);
        assert!(splitter.push(b"ee").is_empty());
        assert_eq!(splitter.push(b"\r"), vec!["three"]);
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn classification_rules() {
        let out = OutputStream::Stdout;
        assert_eq!(classify("[download]  5.0% of 1MiB", out), LogLevel::Progress);
        assert_eq!(classify("ERROR: no formats", out), LogLevel::Error);
        assert_eq!(classify("WARNING: slow", out), LogLevel::Warning);
        assert_eq!(classify("[debug] headers", out), LogLevel::Debug);
        assert_eq!(classify("plain", out), LogLevel::Info);
        assert_eq!(classify("plain", OutputStream::Stderr), LogLevel::Error);
    }

    #[test]
    fn origin_prefers_tagged_lines() {
        assert_eq!(origin("[youtube] abc", OutputStream::Stderr), LogSource::Extractor);
        assert_eq!(origin("hello", OutputStream::Stdout), LogSource::Stdout);
    }
}
