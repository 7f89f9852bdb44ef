// src/config/model.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [queue]
/// poll_interval = "100ms"
/// fetch_timeout = "5m"
///
/// [driver]
/// max_iterations = 100
/// prefetch = ["https://example.com/solver.js"]
///
/// [rpc]
/// call_timeout = "5m"
/// sandbox_timeout = "60s"
///
/// [host]
/// sandbox_program = "deno"
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are
/// kept as strings here and parsed during validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub queue: RawQueueSection,

    #[serde(default)]
    pub driver: DriverSection,

    #[serde(default)]
    pub rpc: RawRpcSection,

    #[serde(default)]
    pub log: LogSection,

    #[serde(default)]
    pub host: HostSection,
}

/// `[queue]` section: poll cadence and per-kind budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawQueueSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Challenge evaluation is polled more eagerly than network work.
    #[serde(default = "default_challenge_poll_interval")]
    pub challenge_poll_interval: String,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: String,

    #[serde(default = "default_download_timeout")]
    pub download_timeout: String,

    #[serde(default = "default_challenge_timeout")]
    pub challenge_timeout: String,

    /// Period of the timeout sweeper.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

fn default_poll_interval() -> String {
    "100ms".to_string()
}

fn default_challenge_poll_interval() -> String {
    "50ms".to_string()
}

fn default_fetch_timeout() -> String {
    "5m".to_string()
}

fn default_download_timeout() -> String {
    "10m".to_string()
}

fn default_challenge_timeout() -> String {
    "2m".to_string()
}

fn default_sweep_interval() -> String {
    "30s".to_string()
}

impl Default for RawQueueSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            challenge_poll_interval: default_challenge_poll_interval(),
            fetch_timeout: default_fetch_timeout(),
            download_timeout: default_download_timeout(),
            challenge_timeout: default_challenge_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// `[driver]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverSection {
    /// Ceiling on full re-executions of one top-level call.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// URLs fetched into the per-call cache before the operation first runs.
    #[serde(default)]
    pub prefetch: Vec<String>,

    /// URL fragments for which a cached response matches on url + method
    /// alone, ignoring headers and body.
    #[serde(default = "default_url_only_patterns")]
    pub url_only_patterns: Vec<String>,
}

fn default_max_iterations() -> usize {
    100
}

fn default_url_only_patterns() -> Vec<String> {
    vec!["github.com/yt-dlp/ejs/releases/download/".to_string()]
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            prefetch: Vec::new(),
            url_only_patterns: default_url_only_patterns(),
        }
    }
}

/// `[rpc]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRpcSection {
    #[serde(default = "default_call_timeout")]
    pub call_timeout: String,

    #[serde(default = "default_sandbox_timeout")]
    pub sandbox_timeout: String,
}

fn default_call_timeout() -> String {
    "5m".to_string()
}

fn default_sandbox_timeout() -> String {
    "60s".to_string()
}

impl Default for RawRpcSection {
    fn default() -> Self {
        Self {
            call_timeout: default_call_timeout(),
            sandbox_timeout: default_sandbox_timeout(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSection {
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    #[serde(default)]
    pub verbose: bool,
}

fn default_ring_capacity() -> usize {
    1000
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
            verbose: false,
        }
    }
}

/// `[host]` section: how the native backend reaches the outside world.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostSection {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    /// Program that evaluates challenge code piped to its stdin.
    #[serde(default = "default_sandbox_program")]
    pub sandbox_program: String,

    #[serde(default = "default_sandbox_args")]
    pub sandbox_args: Vec<String>,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_sandbox_program() -> String {
    "deno".to_string()
}

fn default_sandbox_args() -> Vec<String> {
    vec!["run".to_string(), "-".to_string()]
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            sandbox_program: default_sandbox_program(),
            sandbox_args: default_sandbox_args(),
        }
    }
}

/// Validated queue timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSection {
    pub poll_interval: Duration,
    pub challenge_poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub download_timeout: Duration,
    pub challenge_timeout: Duration,
    pub sweep_interval: Duration,
}

/// Validated RPC timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcSection {
    pub call_timeout: Duration,
    pub sandbox_timeout: Duration,
}

/// Validated configuration. Construct via `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub queue: QueueSection,
    pub driver: DriverSection,
    pub rpc: RpcSection,
    pub log: LogSection,
    pub host: HostSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        queue: QueueSection,
        driver: DriverSection,
        rpc: RpcSection,
        log: LogSection,
        host: HostSection,
    ) -> Self {
        Self {
            queue,
            driver,
            rpc,
            log,
            host,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            queue: QueueSection {
                poll_interval: Duration::from_millis(100),
                challenge_poll_interval: Duration::from_millis(50),
                fetch_timeout: Duration::from_secs(5 * 60),
                download_timeout: Duration::from_secs(10 * 60),
                challenge_timeout: Duration::from_secs(2 * 60),
                sweep_interval: Duration::from_secs(30),
            },
            driver: DriverSection::default(),
            rpc: RpcSection {
                call_timeout: Duration::from_secs(5 * 60),
                sandbox_timeout: Duration::from_secs(60),
            },
            log: LogSection::default(),
            host: HostSection::default(),
        }
    }
}
