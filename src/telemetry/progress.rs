// src/telemetry/progress.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Download progress as reported by the extraction program's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub percent: f64,
    pub downloaded: String,
    pub total: String,
    pub speed: String,
    pub eta: String,
}

/// Byte-level progress reported by the host while it writes a download.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    /// `-1.0` when the total is unknown.
    pub percent: f64,
}

static IN_FLIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?([\d.]+\w+)\s+at\s+([\d.]+\w+/s)(?:\s+ETA\s+(\S+))?")
        .expect("static progress regex")
});

static FINISHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[download\]\s+100%\s+of\s+([\d.]+\w+)").expect("static completion regex")
});

/// Parse lines like
/// `[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05` or
/// `[download] 100% of 10.00MiB in 00:05`.
pub fn parse_progress(line: &str) -> Option<DownloadProgress> {
    if let Some(caps) = IN_FLIGHT.captures(line) {
        return Some(DownloadProgress {
            percent: caps[1].parse().unwrap_or(0.0),
            downloaded: String::new(),
            total: caps[2].to_string(),
            speed: caps[3].to_string(),
            eta: caps
                .get(4)
                .map_or_else(|| "unknown".to_string(), |m| m.as_str().to_string()),
        });
    }

    FINISHED.captures(line).map(|caps| DownloadProgress {
        percent: 100.0,
        downloaded: caps[1].to_string(),
        total: caps[1].to_string(),
        speed: String::new(),
        eta: "00:00".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_in_flight_progress() {
        let p = parse_progress("[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05").unwrap();
        assert_eq!(p.percent, 50.0);
        assert_eq!(p.total, "10.00MiB");
        assert_eq!(p.speed, "1.00MiB/s");
        assert_eq!(p.eta, "00:05");
    }

    #[test]
    fn missing_eta_is_unknown() {
        let p = parse_progress("[download]   3.5% of ~4.20MiB at 512.00KiB/s").unwrap();
        assert_eq!(p.total, "4.20MiB");
        assert_eq!(p.eta, "unknown");
    }

    #[test]
    fn parses_completion() {
        let p = parse_progress("[download] 100% of 10.00MiB in 00:05").unwrap();
        assert_eq!(p.percent, 100.0);
        assert_eq!(p.downloaded, "10.00MiB");
        assert_eq!(p.eta, "00:00");
    }

    #[test]
    fn ignores_other_lines() {
        assert!(parse_progress("[download] Destination: /tmp/a.webm").is_none());
    }
}
