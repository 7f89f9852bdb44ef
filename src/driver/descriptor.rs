// src/driver/descriptor.rs

//! Normalised keys for resources the scripting phase asks for.
//!
//! Two requests with the same descriptor are the same resource as far as
//! the per-call cache is concerned.

use std::path::PathBuf;

use crate::queue::{ChallengeRequest, DownloadRequest, FetchRequest};
use crate::types::QueueKind;

/// How much of a request body takes part in the key.
pub const BODY_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Descriptor {
    Fetch {
        url: String,
        method: String,
        /// Sorted by lower-cased name.
        headers: Vec<(String, String)>,
        body_prefix: Option<String>,
    },
    Download {
        url: String,
        destination: PathBuf,
    },
    /// Hex blake3 digest of the challenge code.
    Challenge(String),
}

impl Descriptor {
    pub fn fetch(request: &FetchRequest) -> Self {
        let mut headers: Vec<(String, String)> = request
            .headers
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();
        headers.sort();

        Descriptor::Fetch {
            url: request.url.clone(),
            method: request.method.to_uppercase(),
            headers,
            body_prefix: request
                .body
                .as_ref()
                .filter(|body| !body.is_empty())
                .map(|body| body.chars().take(BODY_PREFIX_CHARS).collect()),
        }
    }

    pub fn download(request: &DownloadRequest) -> Self {
        Descriptor::Download {
            url: request.url.clone(),
            destination: request.output_path.clone(),
        }
    }

    pub fn challenge(request: &ChallengeRequest) -> Self {
        Descriptor::Challenge(blake3::hash(request.code.as_bytes()).to_hex().to_string())
    }

    pub fn kind(&self) -> QueueKind {
        match self {
            Descriptor::Fetch { .. } => QueueKind::Fetch,
            Descriptor::Download { .. } => QueueKind::Download,
            Descriptor::Challenge(_) => QueueKind::Challenge,
        }
    }

    /// `(url, method)` for fetch descriptors, used by URL-only matching.
    pub fn url_and_method(&self) -> Option<(&str, &str)> {
        match self {
            Descriptor::Fetch { url, method, .. } => Some((url, method)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_key_ignores_header_case_and_method_case() {
        let a = FetchRequest::new("get", "https://example.com/a").with_header("Accept", "x");
        let b = FetchRequest::new("GET", "https://example.com/a").with_header("accept", "x");
        assert_eq!(Descriptor::fetch(&a), Descriptor::fetch(&b));
    }

    #[test]
    fn only_the_body_prefix_counts() {
        let head = "x".repeat(BODY_PREFIX_CHARS);
        let a = FetchRequest::new("POST", "https://example.com").with_body(format!("{head}one"));
        let b = FetchRequest::new("POST", "https://example.com").with_body(format!("{head}two"));
        assert_eq!(Descriptor::fetch(&a), Descriptor::fetch(&b));

        let c = FetchRequest::new("POST", "https://example.com").with_body("short");
        assert_ne!(Descriptor::fetch(&a), Descriptor::fetch(&c));
    }

    #[test]
    fn challenge_key_covers_the_whole_code() {
        let head = "a".repeat(600);
        let a = ChallengeRequest::new(format!("{head}1"));
        let b = ChallengeRequest::new(format!("{head}2"));
        assert_ne!(Descriptor::challenge(&a), Descriptor::challenge(&b));
    }
}
