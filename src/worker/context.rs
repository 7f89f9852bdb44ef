// src/worker/context.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::command::{CommandQueue, ToolCapabilities};
use crate::config::ConfigFile;
use crate::driver::{QueueResolver, RetryDriver};
use crate::errors::{BridgeError, Result};
use crate::protocol::{HostCall, HostReply, Reply, WorkerReply, WorkerRequest};
use crate::queue::{QueueTiming, RequestQueue, Sweepable, SweeperHandle, TimeoutSweeper};
use crate::telemetry::Telemetry;
use crate::worker::capabilities::{ChallengeCapability, DownloadCapability, FetchCapability};
use crate::worker::link::RpcLink;
use crate::worker::program::ExtractionProgram;

pub type WorkerResolver = QueueResolver<FetchCapability, DownloadCapability, ChallengeCapability>;

/// Everything one worker instance owns. Built at startup, torn down with the
/// worker; nothing is shared between instances.
pub struct WorkerContext {
    config: ConfigFile,
    link: Arc<RpcLink>,
    resolver: WorkerResolver,
    sweeper: Option<SweeperHandle>,
    commands: CommandQueue,
    telemetry: Arc<Telemetry>,
    capabilities: ToolCapabilities,
    program: Arc<dyn ExtractionProgram>,
    initialized: bool,
}

impl WorkerContext {
    pub fn new(config: ConfigFile, link: Arc<RpcLink>, program: Arc<dyn ExtractionProgram>) -> Self {
        let queue = config.queue;
        let resolver = QueueResolver {
            fetch: RequestQueue::new(
                FetchCapability::new(Arc::clone(&link)),
                QueueTiming {
                    poll_interval: queue.poll_interval,
                    timeout: queue.fetch_timeout,
                },
            ),
            download: RequestQueue::new(
                DownloadCapability::new(Arc::clone(&link)),
                QueueTiming {
                    poll_interval: queue.poll_interval,
                    timeout: queue.download_timeout,
                },
            ),
            challenge: RequestQueue::new(
                ChallengeCapability::new(Arc::clone(&link)),
                QueueTiming {
                    poll_interval: queue.challenge_poll_interval,
                    timeout: queue.challenge_timeout,
                },
            ),
        };
        let telemetry = Arc::new(Telemetry::new(
            config.log.ring_capacity,
            config.log.verbose,
            Box::new(link.sink()),
        ));

        Self {
            config,
            link,
            resolver,
            sweeper: None,
            commands: CommandQueue::new(),
            telemetry,
            capabilities: ToolCapabilities::fallback(),
            program,
            initialized: false,
        }
    }

    pub fn resolver(&self) -> &WorkerResolver {
        &self.resolver
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Dispatch one top-level request. Callers serialise these.
    pub async fn handle(&mut self, request: WorkerRequest) -> Result<WorkerReply> {
        match request {
            WorkerRequest::Initialize => self.initialize().await,
            WorkerRequest::FetchMetadata { url } => self.fetch_metadata(&url).await,
            WorkerRequest::FetchAndExtract { url, output_path } => {
                self.fetch_and_extract(&url, output_path).await
            }
            WorkerRequest::ExecuteQueuedCommands => {
                let commands = self.commands.execute_queued(self.link.as_ref()).await;
                Ok(WorkerReply::Commands { commands })
            }
            WorkerRequest::GetQueue => Ok(WorkerReply::Commands {
                commands: self.commands.commands().to_vec(),
            }),
            WorkerRequest::SetVerbosity {
                enabled,
                clear_buffer,
            } => {
                self.telemetry.set_verbose(enabled);
                if clear_buffer {
                    self.telemetry.clear();
                }
                Ok(WorkerReply::Verbosity {
                    verbose: enabled,
                    log_buffer: if enabled {
                        self.telemetry.snapshot()
                    } else {
                        Vec::new()
                    },
                })
            }
        }
    }

    async fn initialize(&mut self) -> Result<WorkerReply> {
        if !self.initialized {
            self.capabilities = self.probe_capabilities().await;

            let queues: Vec<Arc<dyn Sweepable>> = vec![
                Arc::new(self.resolver.fetch.clone()),
                Arc::new(self.resolver.download.clone()),
                Arc::new(self.resolver.challenge.clone()),
            ];
            self.sweeper =
                Some(TimeoutSweeper::new(queues).spawn(self.config.queue.sweep_interval));
            self.initialized = true;
            info!(version = %self.capabilities.version, "worker initialized");
        }

        Ok(WorkerReply::Initialized {
            capabilities: self.capabilities.clone(),
        })
    }

    async fn probe_capabilities(&self) -> ToolCapabilities {
        match self.link.invoke(HostCall::ProbeCapabilities).await {
            Ok(HostReply::Tool(output)) if output.exit_code == 0 => {
                info!("tool capabilities loaded from host");
                ToolCapabilities::from_probe(&output)
            }
            Ok(other) => {
                warn!(reply = ?other, "capability probe unusable; using static capabilities");
                ToolCapabilities::fallback()
            }
            Err(err) => {
                warn!(error = %err, "capability probe failed; using static capabilities");
                ToolCapabilities::fallback()
            }
        }
    }

    fn ensure_ready(&self, raw_url: &str) -> Result<Url> {
        if !self.initialized {
            return Err(BridgeError::NotInitialized);
        }
        let url = Url::parse(raw_url).map_err(|e| BridgeError::InvalidUrl(format!("{raw_url}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(BridgeError::InvalidUrl(format!("unsupported scheme '{other}'"))),
        }
    }

    async fn fetch_metadata(&mut self, raw_url: &str) -> Result<WorkerReply> {
        let url = self.ensure_ready(raw_url)?;
        info!(%url, program = self.program.name(), "extracting info");

        let program = Arc::clone(&self.program);
        let mut driver = RetryDriver::new(&self.resolver, &self.capabilities, &self.config.driver)
            .with_telemetry(&self.telemetry);
        driver.prefetch(&self.config.driver.prefetch).await;

        let outcome = driver
            .run(&mut self.commands, |script| program.extract_info(script, &url))
            .await;
        self.telemetry.flush();

        Ok(WorkerReply::Metadata(outcome?.value))
    }

    async fn fetch_and_extract(&mut self, raw_url: &str, output_path: PathBuf) -> Result<WorkerReply> {
        let url = self.ensure_ready(raw_url)?;
        if output_path.as_os_str().is_empty() {
            return Err(BridgeError::Operation("empty output path".to_string()));
        }
        info!(%url, output = %output_path.display(), "extracting audio");

        let program = Arc::clone(&self.program);
        let mut driver = RetryDriver::new(&self.resolver, &self.capabilities, &self.config.driver)
            .with_telemetry(&self.telemetry);
        driver.prefetch(&self.config.driver.prefetch).await;

        let outcome = driver
            .run(&mut self.commands, |script| {
                program.extract_audio(script, &url, &output_path)
            })
            .await;
        self.telemetry.flush();

        let driven = outcome?;
        info!(
            iterations = driven.iterations,
            commands = driven.commands.len(),
            "extraction phase complete"
        );
        Ok(WorkerReply::Extraction {
            info: driven.value,
            commands: driven.commands,
        })
    }

    pub async fn reply(&self, id: u64, result: Reply<WorkerReply>) -> Result<()> {
        self.link.reply(id, result).await
    }

    /// Stop background work and fail anything still waiting on the host.
    pub async fn shutdown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop().await;
        }
        self.link.fail_all("worker terminated");
    }
}
