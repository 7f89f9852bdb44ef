// src/driver/cache.rs

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::driver::descriptor::Descriptor;
use crate::queue::{ChallengeRequest, DownloadRequest, FetchRequest, HttpResponse};

/// Resources already obtained during one top-level call.
///
/// A fresh cache is created for every call, so nothing leaks from one
/// extraction into the next.
#[derive(Debug, Clone, Default)]
pub struct ResourceCache {
    responses: HashMap<Descriptor, HttpResponse>,
    downloads: HashMap<Descriptor, PathBuf>,
    challenges: HashMap<Descriptor, String>,
    url_only_patterns: Vec<String>,
}

impl ResourceCache {
    pub fn new(url_only_patterns: Vec<String>) -> Self {
        Self {
            url_only_patterns,
            ..Self::default()
        }
    }

    /// Exact match first; for URLs matching a url-only pattern any cached
    /// response with the same url and method will do.
    pub fn response(&self, request: &FetchRequest) -> Option<&HttpResponse> {
        let key = Descriptor::fetch(request);
        if let Some(hit) = self.responses.get(&key) {
            debug!(url = %request.url, "cache hit");
            return Some(hit);
        }

        if !self
            .url_only_patterns
            .iter()
            .any(|pattern| request.url.contains(pattern.as_str()))
        {
            return None;
        }

        let (url, method) = key.url_and_method()?;
        let hit = self.responses.iter().find_map(|(cached, response)| {
            (cached.url_and_method() == Some((url, method))).then_some(response)
        });
        if hit.is_some() {
            debug!(url = %request.url, "cache hit (url match)");
        }
        hit
    }

    pub fn insert_response(&mut self, request: &FetchRequest, response: HttpResponse) {
        self.responses.insert(Descriptor::fetch(request), response);
    }

    pub fn download(&self, request: &DownloadRequest) -> Option<&PathBuf> {
        self.downloads.get(&Descriptor::download(request))
    }

    pub fn insert_download(&mut self, request: &DownloadRequest, path: PathBuf) {
        self.downloads.insert(Descriptor::download(request), path);
    }

    pub fn challenge(&self, request: &ChallengeRequest) -> Option<&String> {
        self.challenges.get(&Descriptor::challenge(request))
    }

    pub fn insert_challenge(&mut self, request: &ChallengeRequest, result: String) {
        self.challenges.insert(Descriptor::challenge(request), result);
    }

    pub fn len(&self) -> usize {
        self.responses.len() + self.downloads.len() + self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
