// src/telemetry/mod.rs

//! Output capture for the scripting runtime.
//!
//! Raw stdout/stderr bytes are split into lines, classified, kept in a
//! bounded ring, and published to the host as log and progress events.

pub mod lines;
pub mod progress;
pub mod ring;

use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use lines::{LineSplitter, classify, origin};
pub use progress::{DownloadProgress, TransferProgress, parse_progress};
pub use ring::LogRing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Progress,
}

impl LogLevel {
    /// Levels that are surfaced even when verbosity is off.
    pub fn is_notable(self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Warning | LogLevel::Progress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    Extractor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub source: LogSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Log(LogEntry),
    Progress(DownloadProgress),
}

/// Where classified events go. Publishing must not block.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, event: TelemetryEvent);
}

/// Discards everything; useful when nobody is listening.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&self, _event: TelemetryEvent) {}
}

struct State {
    stdout: LineSplitter,
    stderr: LineSplitter,
    ring: LogRing,
    verbose: bool,
}

/// Per-worker output capture.
pub struct Telemetry {
    state: Mutex<State>,
    sink: Box<dyn TelemetrySink>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Telemetry")
            .field("buffered", &state.ring.len())
            .field("verbose", &state.verbose)
            .finish()
    }
}

impl Telemetry {
    pub fn new(capacity: usize, verbose: bool, sink: Box<dyn TelemetrySink>) -> Self {
        Self {
            state: Mutex::new(State {
                stdout: LineSplitter::new(),
                stderr: LineSplitter::new(),
                ring: LogRing::new(capacity),
                verbose,
            }),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed raw bytes written by the runtime to one of its streams.
    pub fn write(&self, stream: OutputStream, bytes: &[u8]) {
        let lines = {
            let mut state = self.lock();
            match stream {
                OutputStream::Stdout => state.stdout.push(bytes),
                OutputStream::Stderr => state.stderr.push(bytes),
            }
        };
        for line in lines {
            self.record_line(stream, &line);
        }
    }

    /// Process any unterminated trailing output.
    pub fn flush(&self) {
        let (out, err) = {
            let mut state = self.lock();
            (state.stdout.flush(), state.stderr.flush())
        };
        if let Some(line) = out {
            self.record_line(OutputStream::Stdout, &line);
        }
        if let Some(line) = err {
            self.record_line(OutputStream::Stderr, &line);
        }
    }

    /// Classify one complete line, buffer it and publish it.
    pub fn record_line(&self, stream: OutputStream, line: &str) -> Option<LogEntry> {
        if line.trim().is_empty() {
            return None;
        }

        let entry = LogEntry {
            level: classify(line, stream),
            message: line.to_string(),
            timestamp: now_millis(),
            source: origin(line, stream),
        };

        let verbose = {
            let mut state = self.lock();
            state.ring.push(entry.clone());
            state.verbose
        };

        if verbose || entry.level.is_notable() {
            info!(stream = ?stream, level = ?entry.level, "{}", line);
        } else {
            debug!(stream = ?stream, level = ?entry.level, "{}", line);
        }

        if let Some(progress) = parse_progress(line) {
            self.sink.publish(TelemetryEvent::Progress(progress));
        }
        self.sink.publish(TelemetryEvent::Log(entry.clone()));
        Some(entry)
    }

    pub fn set_verbose(&self, enabled: bool) {
        self.lock().verbose = enabled;
        info!(enabled, "verbose mode changed");
    }

    pub fn is_verbose(&self) -> bool {
        self.lock().verbose
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().ring.snapshot()
    }

    pub fn clear(&self) {
        self.lock().ring.clear();
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Collect(Arc<Mutex<Vec<TelemetryEvent>>>);

    impl TelemetrySink for Collect {
        fn publish(&self, event: TelemetryEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn progress_lines_publish_progress_then_log() {
        let sink = Collect::default();
        let telemetry = Telemetry::new(10, false, Box::new(sink.clone()));

        telemetry.write(
            OutputStream::Stdout,
            b"[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05\n",
        );

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TelemetryEvent::Progress(ref p) if p.percent == 50.0));
        assert!(matches!(
            events[1],
            TelemetryEvent::Log(ref e) if e.level == LogLevel::Progress && e.source == LogSource::Extractor
        ));
    }

    #[test]
    fn whitespace_lines_are_skipped_and_flush_emits_tail() {
        let telemetry = Telemetry::new(10, true, Box::new(NullSink));
        telemetry.write(OutputStream::Stderr, b"   \npartial");
        assert!(telemetry.snapshot().is_empty());

        telemetry.flush();
        let entries = telemetry.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[0].message, "partial");
    }

    #[test]
    fn clear_empties_the_buffer() {
        let telemetry = Telemetry::new(10, false, Box::new(NullSink));
        telemetry.record_line(OutputStream::Stdout, "hello");
        telemetry.clear();
        assert!(telemetry.snapshot().is_empty());
    }
}
