// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, QueueSection, RawConfigFile, RpcSection};
use crate::errors::{BridgeError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BridgeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let queue = validate_queue(&raw)?;
        let rpc = validate_rpc(&raw)?;
        validate_driver(&raw)?;
        validate_log(&raw)?;
        validate_host(&raw)?;
        Ok(ConfigFile::new_unchecked(queue, raw.driver, rpc, raw.log, raw.host))
    }
}

fn validate_queue(cfg: &RawConfigFile) -> Result<QueueSection> {
    let q = &cfg.queue;
    Ok(QueueSection {
        poll_interval: duration_field("queue", "poll_interval", &q.poll_interval)?,
        challenge_poll_interval: duration_field(
            "queue",
            "challenge_poll_interval",
            &q.challenge_poll_interval,
        )?,
        fetch_timeout: duration_field("queue", "fetch_timeout", &q.fetch_timeout)?,
        download_timeout: duration_field("queue", "download_timeout", &q.download_timeout)?,
        challenge_timeout: duration_field("queue", "challenge_timeout", &q.challenge_timeout)?,
        sweep_interval: duration_field("queue", "sweep_interval", &q.sweep_interval)?,
    })
}

fn validate_rpc(cfg: &RawConfigFile) -> Result<RpcSection> {
    Ok(RpcSection {
        call_timeout: duration_field("rpc", "call_timeout", &cfg.rpc.call_timeout)?,
        sandbox_timeout: duration_field("rpc", "sandbox_timeout", &cfg.rpc.sandbox_timeout)?,
    })
}

fn validate_driver(cfg: &RawConfigFile) -> Result<()> {
    if cfg.driver.max_iterations == 0 {
        return Err(BridgeError::ConfigError(
            "[driver].max_iterations must be >= 1 (got 0)".to_string(),
        ));
    }
    for url in &cfg.driver.prefetch {
        if url::Url::parse(url).is_err() {
            return Err(BridgeError::ConfigError(format!(
                "[driver].prefetch contains an invalid URL '{}'",
                url
            )));
        }
    }
    Ok(())
}

fn validate_log(cfg: &RawConfigFile) -> Result<()> {
    if cfg.log.ring_capacity == 0 {
        return Err(BridgeError::ConfigError(
            "[log].ring_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_host(cfg: &RawConfigFile) -> Result<()> {
    let programs = [
        ("ffmpeg", &cfg.host.ffmpeg),
        ("ffprobe", &cfg.host.ffprobe),
        ("sandbox_program", &cfg.host.sandbox_program),
    ];
    for (field, value) in programs {
        if value.trim().is_empty() {
            return Err(BridgeError::ConfigError(format!(
                "[host].{} must not be empty",
                field
            )));
        }
    }
    Ok(())
}

fn duration_field(section: &str, field: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value).map_err(|e| {
        BridgeError::ConfigError(format!("[{}].{}: {}", section, field, e))
    })?;
    if duration.is_zero() {
        return Err(BridgeError::ConfigError(format!(
            "[{}].{} must be greater than zero",
            section, field
        )));
    }
    Ok(duration)
}

/// Parse a duration string like `"250ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration(" 5m "), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_missing_or_unknown_units() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn defaults_validate_to_documented_values() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.queue.fetch_timeout, Duration::from_secs(300));
        assert_eq!(cfg.queue.download_timeout, Duration::from_secs(600));
        assert_eq!(cfg.queue.challenge_timeout, Duration::from_secs(120));
        assert_eq!(cfg.queue.sweep_interval, Duration::from_secs(30));
        assert_eq!(cfg.rpc.sandbox_timeout, Duration::from_secs(60));
        assert_eq!(cfg.driver.max_iterations, 100);
        assert_eq!(cfg.log.ring_capacity, 1000);
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.driver.max_iterations = 0;
        match ConfigFile::try_from(raw) {
            Err(BridgeError::ConfigError(msg)) => assert!(msg.contains("max_iterations")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn zero_duration_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.rpc.sandbox_timeout = "0s".to_string();
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(BridgeError::ConfigError(_))
        ));
    }
}
