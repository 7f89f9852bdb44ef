// src/command/capabilities.rs

//! Static or probed description of the conversion tool, used to answer
//! trivial introspection without spawning a process.

use serde::{Deserialize, Serialize};

use crate::types::ToolOutput;

const STATIC_VERSION: &str = "ffmpeg version 5.1.4 Copyright (c) 2000-2023 the FFmpeg developers";
const STATIC_CONFIGURATION: &str = "--target-os=none --arch=x86_32 --enable-cross-compile";
const STATIC_BITSTREAM_FILTERS: &[&str] = &[
    "aac_adtstoasc",
    "av1_frame_merge",
    "av1_frame_split",
    "av1_metadata",
    "chomp",
    "dump_extra",
    "dca_core",
    "dv_error_marker",
    "eac3_core",
    "extract_extradata",
    "filter_units",
    "h264_metadata",
    "h264_mp4toannexb",
    "h264_redundant_pps",
    "hapqa_extract",
    "hevc_metadata",
    "hevc_mp4toannexb",
    "imxdump",
    "mjpeg2jpeg",
    "mjpegadump",
    "mp3decomp",
    "mpeg2_metadata",
    "mpeg4_unpack_bframes",
    "mov2textsub",
    "noise",
    "null",
    "opus_metadata",
    "pcm_rechunk",
    "pgs_frame_merge",
    "prores_metadata",
    "remove_extra",
    "setts",
    "text2movsub",
    "trace_headers",
    "truehd_core",
    "vp9_metadata",
    "vp9_raw_reorder",
    "vp9_superframe",
    "vp9_superframe_split",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapabilities {
    pub version: String,
    pub bitstream_filters: Vec<String>,
    pub configuration: String,
}

impl Default for ToolCapabilities {
    fn default() -> Self {
        Self::fallback()
    }
}

impl ToolCapabilities {
    /// Capabilities assumed when the real tool cannot be probed.
    pub fn fallback() -> Self {
        Self {
            version: STATIC_VERSION.to_string(),
            bitstream_filters: STATIC_BITSTREAM_FILTERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            configuration: STATIC_CONFIGURATION.to_string(),
        }
    }

    /// Build from `ffprobe -bsfs` output; any missing piece falls back to the
    /// static descriptor.
    pub fn from_probe(output: &ToolOutput) -> Self {
        let fallback = Self::fallback();

        let filters: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("Bitstream"))
            .map(str::to_string)
            .collect();

        let version = banner_line(&output.stderr).unwrap_or(fallback.version);
        let configuration =
            find_after(&output.stderr, "configuration: ").unwrap_or(fallback.configuration);

        Self {
            version,
            bitstream_filters: if filters.is_empty() {
                fallback.bitstream_filters
            } else {
                filters
            },
            configuration,
        }
    }

    /// Synthetic answer for `ffprobe -bsfs`.
    pub fn bsfs_output(&self) -> ToolOutput {
        ToolOutput::success(
            self.bitstream_filters.join("\n"),
            format!("{}\n  configuration: {}", self.version, self.configuration),
        )
    }

    /// Synthetic answer for `-version`.
    pub fn version_output(&self) -> ToolOutput {
        ToolOutput::success(self.version.clone(), String::new())
    }
}

/// The `ffmpeg version ...` or `ffprobe version ...` line, marker included.
fn banner_line(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        ["ffmpeg version ", "ffprobe version "]
            .iter()
            .find_map(|marker| line.find(marker))
            .map(|idx| line[idx..].trim_end().to_string())
    })
}

fn find_after(text: &str, marker: &str) -> Option<String> {
    text.lines().find_map(|line| {
        line.find(marker)
            .map(|idx| line[idx + marker.len()..].trim().to_string())
            .filter(|rest| !rest.is_empty())
    })
}
