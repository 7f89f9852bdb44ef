// src/driver/retry.rs

use tracing::{debug, info, warn};

use crate::command::{Command, CommandQueue, ToolCapabilities};
use crate::config::DriverSection;
use crate::driver::cache::ResourceCache;
use crate::driver::resolve::Resolver;
use crate::driver::script::{Interrupt, ResourceRequest, Script, Step};
use crate::errors::{BridgeError, Result};
use crate::queue::FetchRequest;
use crate::telemetry::Telemetry;

/// Successful result of a driven call.
#[derive(Debug, Clone)]
pub struct Driven<T> {
    pub value: T,
    /// Tool commands committed by the final iteration, in staging order.
    pub commands: Vec<Command>,
    /// Total executions of the operation, the successful one included.
    pub iterations: usize,
}

/// Runs a synchronous operation to completion by resolving every resource it
/// asks for and re-executing it from the start.
///
/// One driver serves one top-level call; its cache is discarded with it.
pub struct RetryDriver<'a> {
    resolver: &'a dyn Resolver,
    capabilities: &'a ToolCapabilities,
    telemetry: Option<&'a Telemetry>,
    max_iterations: usize,
    cache: ResourceCache,
}

impl<'a> RetryDriver<'a> {
    pub fn new(
        resolver: &'a dyn Resolver,
        capabilities: &'a ToolCapabilities,
        settings: &DriverSection,
    ) -> Self {
        Self {
            resolver,
            capabilities,
            telemetry: None,
            max_iterations: settings.max_iterations,
            cache: ResourceCache::new(settings.url_only_patterns.clone()),
        }
    }

    pub fn with_telemetry(mut self, telemetry: &'a Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Fetch each URL into the cache ahead of the first execution.
    ///
    /// Failures are logged and otherwise ignored; the operation will simply
    /// ask for the resource again if it turns out to need it.
    pub async fn prefetch(&mut self, urls: &[String]) {
        for url in urls {
            let request = FetchRequest::get(url.as_str());
            if self.cache.response(&request).is_some() {
                debug!(%url, "prefetch: already cached");
                continue;
            }

            info!(%url, "prefetching");
            match self.resolver.fetch(request.clone()).await {
                Ok(response) => {
                    info!(%url, bytes = response.body.len(), "prefetched");
                    self.cache.insert_response(&request, response);
                }
                Err(err) => warn!(%url, error = %err, "prefetch failed"),
            }
        }
    }

    /// Execute `op` until it returns a value, fails, or the iteration
    /// ceiling is reached.
    ///
    /// Tool commands staged by the successful iteration are committed to
    /// `commands`; earlier, interrupted iterations commit nothing.
    pub async fn run<T, F>(&mut self, commands: &mut CommandQueue, mut op: F) -> Result<Driven<T>>
    where
        F: FnMut(&mut Script<'_>) -> Step<T>,
    {
        for iteration in 1..=self.max_iterations {
            let (outcome, staged) = {
                let mut script =
                    Script::new(&self.cache, self.capabilities, self.telemetry, iteration);
                let outcome = op(&mut script);
                (outcome, script.into_staged())
            };

            match outcome {
                Ok(value) => {
                    let committed = staged
                        .into_iter()
                        .map(|cmd| commands.enqueue(cmd.kind, cmd.args))
                        .collect();
                    info!(iterations = iteration, "operation completed");
                    return Ok(Driven {
                        value,
                        commands: committed,
                        iterations: iteration,
                    });
                }
                Err(Interrupt::Fail(message)) => {
                    warn!(iteration, error = %message, "operation failed");
                    return Err(BridgeError::Operation(message));
                }
                Err(Interrupt::Need(request)) => {
                    info!(iteration, kind = %request.kind(), "resolving resource before re-run");
                    self.resolve(request).await?;
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "retry budget exhausted");
        Err(BridgeError::RetryBudgetExceeded {
            iterations: self.max_iterations,
        })
    }

    async fn resolve(&mut self, request: ResourceRequest) -> Result<()> {
        match request {
            ResourceRequest::Fetch(req) => {
                let response = self.resolver.fetch(req.clone()).await?;
                self.cache.insert_response(&req, response);
            }
            ResourceRequest::Download(req) => {
                let path = self.resolver.download(req.clone()).await?;
                self.cache.insert_download(&req, path);
            }
            ResourceRequest::Challenge(req) => {
                let result = self.resolver.challenge(req.clone()).await?;
                self.cache.insert_challenge(&req, result);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::queue::{ChallengeRequest, DownloadRequest, HttpResponse};
    use crate::types::{BoxFuture, ToolKind};

    #[derive(Default)]
    struct Counting {
        fetches: AtomicUsize,
    }

    impl Resolver for Counting {
        fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<HttpResponse>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(HttpResponse::ok(request.url)) })
        }

        fn download(&self, request: DownloadRequest) -> BoxFuture<'_, Result<PathBuf>> {
            Box::pin(async move { Ok(request.output_path) })
        }

        fn challenge(&self, request: ChallengeRequest) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move { Ok(format!("solved:{}", request.code.len())) })
        }
    }

    fn settings(max_iterations: usize) -> DriverSection {
        DriverSection {
            max_iterations,
            ..DriverSection::default()
        }
    }

    #[tokio::test]
    async fn staged_commands_are_committed_once() {
        let resolver = Counting::default();
        let caps = ToolCapabilities::fallback();
        let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
        let mut queue = CommandQueue::new();

        let driven = driver
            .run(&mut queue, |script| {
                script.run_tool(ToolKind::Ffmpeg, vec!["-i".into(), "a".into(), "b".into()]);
                let page = script.fetch(FetchRequest::get("https://example.com/page"))?;
                let key = script.solve_challenge(page.body)?;
                Ok(key)
            })
            .await
            .unwrap();

        assert_eq!(driven.iterations, 3);
        assert_eq!(driven.value, "solved:24");
        assert_eq!(driven.commands.len(), 1);
        assert_eq!(queue.commands().len(), 1);
    }

    #[tokio::test]
    async fn fail_interrupt_surfaces_as_operation_error() {
        let resolver = Counting::default();
        let caps = ToolCapabilities::fallback();
        let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
        let mut queue = CommandQueue::new();

        let err = driver
            .run(&mut queue, |_| -> Step<()> { Err(Interrupt::fail("no formats")) })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Operation(ref m) if m == "no formats"));
    }

    #[tokio::test]
    async fn prefetched_urls_are_not_fetched_again() {
        let resolver = Counting::default();
        let caps = ToolCapabilities::fallback();
        let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
        let mut queue = CommandQueue::new();

        let url = "https://example.com/solver.js".to_string();
        driver.prefetch(std::slice::from_ref(&url)).await;
        driver.prefetch(std::slice::from_ref(&url)).await;

        let driven = driver
            .run(&mut queue, |script| script.fetch(FetchRequest::get(url.as_str())))
            .await
            .unwrap();
        assert_eq!(driven.iterations, 1);
        assert_eq!(resolver.fetches.load(Ordering::SeqCst), 1);
    }
}
