// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod driver;
pub mod errors;
pub mod host;
pub mod logging;
pub mod protocol;
pub mod queue;
pub mod telemetry;
pub mod types;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::{CliArgs, CliCommand};
use crate::config::loader::{default_config_path, load_and_validate, load_or_default};
use crate::config::model::ConfigFile;
use crate::host::{HostBridge, NativeHost};
use crate::worker::DirectMediaProgram;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the native host backend
/// - a worker running the direct-media extraction program
/// - progress reporting on stderr
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_or_default(default_config_path())?,
    };
    if args.verbose {
        cfg.log.verbose = true;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let verbose = cfg.log.verbose;
    let backend = NativeHost::new(cfg.host.clone()).context("building HTTP client")?;
    let mut bridge = HostBridge::start(cfg, Arc::new(backend), Arc::new(DirectMediaProgram::new()));

    let mut progress = bridge.subscribe_progress();
    let reporter = tokio::spawn(async move {
        while let Ok(p) = progress.recv().await {
            info!(
                percent = p.percent,
                downloaded = %p.downloaded,
                total = %p.total,
                speed = %p.speed,
                eta = %p.eta,
                "download progress"
            );
        }
    });

    let outcome = execute(&bridge, &args.command, verbose).await;

    bridge.destroy();
    reporter.abort();
    outcome
}

async fn execute(bridge: &HostBridge, command: &CliCommand, verbose: bool) -> Result<()> {
    let capabilities = bridge.initialize().await.context("initializing worker")?;
    if verbose {
        bridge.set_verbosity(true, true).await?;
    }

    match command {
        CliCommand::Info { url } => {
            let info = bridge
                .fetch_metadata(url)
                .await
                .with_context(|| format!("fetching metadata for {url}"))?;
            print_json(&info)
        }
        CliCommand::Extract { url, output } => {
            let info = bridge
                .extract_audio(url, output.clone())
                .await
                .with_context(|| format!("extracting audio from {url}"))?;
            print_json(&info)
        }
        CliCommand::Capabilities => print_json(&capabilities),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

/// Simple dry-run output: print the effective settings.
fn print_dry_run(cfg: &ConfigFile) {
    println!("tapebridge dry-run");
    println!("  queue.poll_interval = {:?}", cfg.queue.poll_interval);
    println!(
        "  queue.challenge_poll_interval = {:?}",
        cfg.queue.challenge_poll_interval
    );
    println!("  queue.fetch_timeout = {:?}", cfg.queue.fetch_timeout);
    println!("  queue.download_timeout = {:?}", cfg.queue.download_timeout);
    println!("  queue.challenge_timeout = {:?}", cfg.queue.challenge_timeout);
    println!("  queue.sweep_interval = {:?}", cfg.queue.sweep_interval);
    println!("  driver.max_iterations = {}", cfg.driver.max_iterations);
    if !cfg.driver.prefetch.is_empty() {
        println!("  driver.prefetch = {:?}", cfg.driver.prefetch);
    }
    if !cfg.driver.url_only_patterns.is_empty() {
        println!(
            "  driver.url_only_patterns = {:?}",
            cfg.driver.url_only_patterns
        );
    }
    println!("  rpc.call_timeout = {:?}", cfg.rpc.call_timeout);
    println!("  rpc.sandbox_timeout = {:?}", cfg.rpc.sandbox_timeout);
    println!("  log.ring_capacity = {}", cfg.log.ring_capacity);
    println!("  log.verbose = {}", cfg.log.verbose);
    println!("  host.ffmpeg = {}", cfg.host.ffmpeg);
    println!("  host.ffprobe = {}", cfg.host.ffprobe);
    println!("  host.sandbox = {} {:?}", cfg.host.sandbox_program, cfg.host.sandbox_args);

    debug!("dry-run complete (no execution)");
}
