// src/worker/program.rs

//! The extraction program seam.
//!
//! An extraction program is synchronous code that runs inside a
//! [`Script`]. It may be executed many times for one call, so it must not
//! have durable side effects other than the tool commands it stages.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use url::Url;

use crate::driver::{Interrupt, Script, Step};
use crate::queue::{DownloadRequest, FetchRequest};
use crate::types::ToolKind;

pub trait ExtractionProgram: Send + Sync {
    fn name(&self) -> &str;

    /// Metadata only; nothing is downloaded.
    fn extract_info(&self, script: &mut Script<'_>, url: &Url) -> Step<Value>;

    /// Obtain the media and stage whatever conversion produces the audio
    /// file at (or next to) `output_path`.
    fn extract_audio(&self, script: &mut Script<'_>, url: &Url, output_path: &Path)
    -> Step<Value>;
}

/// Handles URLs that point straight at a media file.
///
/// Metadata comes from a `HEAD` request. Audio extraction downloads the file
/// next to the requested output as `<stem>_raw.<ext>` and stages an ffmpeg
/// remux of its audio track into ADTS.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectMediaProgram;

impl DirectMediaProgram {
    pub fn new() -> Self {
        Self
    }
}

impl ExtractionProgram for DirectMediaProgram {
    fn name(&self) -> &str {
        "direct"
    }

    fn extract_info(&self, script: &mut Script<'_>, url: &Url) -> Step<Value> {
        let response = script.fetch(FetchRequest::new("HEAD", url.as_str()))?;
        if !response.is_success() {
            return Err(Interrupt::fail(format!(
                "ERROR: HTTP Error {} for {}",
                response.status, url
            )));
        }

        let content_type = header(&response.headers, "content-type");
        let length = header(&response.headers, "content-length").and_then(|v| v.parse::<u64>().ok());
        let ext = media_extension(url, content_type.as_deref());
        let title = file_stem(url).unwrap_or_else(|| url.host_str().unwrap_or("media").to_string());

        script.emit_stdout(&format!("[direct] {title}: {} ({ext})", url));

        Ok(json!({
            "id": title,
            "title": title,
            "extractor": self.name(),
            "webpage_url": url.as_str(),
            "ext": ext,
            "filesize": length,
            "formats": [{
                "format_id": "direct",
                "url": url.as_str(),
                "ext": ext,
                "acodec": content_type.as_deref().unwrap_or("unknown"),
                "vcodec": "none",
                "filesize": length,
            }],
        }))
    }

    fn extract_audio(&self, script: &mut Script<'_>, url: &Url, output_path: &Path) -> Step<Value> {
        let mut info = self.extract_info(script, url)?;
        let ext = info["ext"].as_str().unwrap_or("webm").to_string();

        let raw_path = raw_path(output_path, &ext);
        script.emit_stdout(&format!("[download] Destination: {}", raw_path.display()));
        let raw = script.download(DownloadRequest::new(url.as_str(), raw_path))?;
        script.emit_stdout(&format!("[download] Raw audio saved to: {}", raw.display()));

        let output = aac_path(output_path);
        let args = vec![
            "-i".to_string(),
            raw.display().to_string(),
            "-vn".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "adts".to_string(),
            "-y".to_string(),
            output.display().to_string(),
        ];
        let result = script.run_tool(ToolKind::Ffmpeg, args);
        if result.exit_code != 0 {
            return Err(Interrupt::fail(result.stderr));
        }
        script.emit_stdout(&format!("[direct] Audio saved to: {}", output.display()));

        info["_output_path"] = json!(output.display().to_string());
        Ok(info)
    }
}

fn header(headers: &std::collections::BTreeMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

fn file_stem(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let stem = Path::new(last).file_stem()?.to_str()?;
    (!stem.is_empty()).then(|| stem.to_string())
}

fn media_extension(url: &Url, content_type: Option<&str>) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| Path::new(last).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);
    if let Some(ext) = from_path {
        return ext;
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_lowercase());
    match mime.as_deref() {
        Some("audio/mp4") | Some("video/mp4") => "m4a",
        Some("audio/mpeg") => "mp3",
        Some("audio/ogg") => "ogg",
        Some("audio/aac") => "aac",
        _ => "webm",
    }
    .to_string()
}

/// `<dir>/<stem>_raw.<ext>` next to the requested output.
pub fn raw_path(output_path: &Path, ext: &str) -> PathBuf {
    let stem = output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    output_path.with_file_name(format!("{stem}_raw.{ext}"))
}

/// `.mp3` and `.m4a` outputs become `.aac`; other paths are kept.
pub fn aac_path(output_path: &Path) -> PathBuf {
    match output_path.extension().and_then(|e| e.to_str()) {
        Some("mp3") | Some("m4a") => output_path.with_extension("aac"),
        _ => output_path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths() {
        let out = Path::new("/tmp/music/song.mp3");
        assert_eq!(raw_path(out, "webm"), PathBuf::from("/tmp/music/song_raw.webm"));
        assert_eq!(aac_path(out), PathBuf::from("/tmp/music/song.aac"));
        assert_eq!(aac_path(Path::new("/tmp/a.aac")), PathBuf::from("/tmp/a.aac"));
    }

    #[test]
    fn extension_prefers_path_then_mime() {
        let with_ext = Url::parse("https://cdn.example.com/a/track.OPUS").unwrap();
        assert_eq!(media_extension(&with_ext, None), "opus");

        let bare = Url::parse("https://cdn.example.com/stream").unwrap();
        assert_eq!(media_extension(&bare, Some("audio/mp4; codecs=mp4a")), "m4a");
        assert_eq!(media_extension(&bare, None), "webm");
    }
}
