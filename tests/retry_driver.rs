// tests/retry_driver.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tapebridge::command::CommandQueue;
use tapebridge::command::ToolCapabilities;
use tapebridge::config::DriverSection;
use tapebridge::driver::{QueueResolver, RetryDriver};
use tapebridge::errors::BridgeError;
use tapebridge::queue::{
    ChallengeRequest, DownloadRequest, FetchRequest, HttpResponse, QueueTiming, RequestQueue,
};
use tapebridge::types::{CommandStatus, QueueKind, ToolKind};
use tapebridge_test_utils::fake_capability::FakeCapability;
use tapebridge_test_utils::{init_tracing, with_timeout};

type FakeResolver = QueueResolver<
    FakeCapability<FetchRequest, HttpResponse>,
    FakeCapability<DownloadRequest, PathBuf>,
    FakeCapability<ChallengeRequest, String>,
>;

fn timing() -> QueueTiming {
    QueueTiming {
        poll_interval: Duration::from_millis(2),
        timeout: Duration::from_secs(2),
    }
}

fn resolver_with(fetch: FakeCapability<FetchRequest, HttpResponse>) -> FakeResolver {
    QueueResolver {
        fetch: RequestQueue::new(fetch, timing()),
        download: RequestQueue::new(FakeCapability::download(), timing()),
        challenge: RequestQueue::new(FakeCapability::challenge("n-sig"), timing()),
    }
}

fn settings(max_iterations: usize) -> DriverSection {
    DriverSection {
        max_iterations,
        ..DriverSection::default()
    }
}

#[tokio::test]
async fn every_kind_of_resource_is_resolved_through_its_queue() {
    init_tracing();

    let resolver = resolver_with(FakeCapability::fetch(200, "player code"));
    let caps = ToolCapabilities::fallback();
    let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
    let mut commands = CommandQueue::new();

    let driven = with_timeout(driver.run(&mut commands, |script| {
        let page = script.fetch(FetchRequest::get("https://example.com/watch"))?;
        let sig = script.solve_challenge(page.body)?;
        let file = script.download(DownloadRequest::new(
            "https://cdn.example.com/v.webm",
            "/tmp/v_raw.webm",
        ))?;
        Ok((sig, file))
    }))
    .await
    .unwrap();

    assert_eq!(driven.iterations, 4);
    assert_eq!(driven.value.0, "n-sig");
    assert_eq!(driven.value.1, PathBuf::from("/tmp/v_raw.webm"));
    assert_eq!(driver.cache().len(), 3);
}

#[tokio::test]
async fn unstable_descriptors_exhaust_the_iteration_budget() {
    init_tracing();

    let fetch = FakeCapability::fetch(200, "");
    let executed = fetch.executed();
    let resolver = resolver_with(fetch);
    let caps = ToolCapabilities::fallback();
    let mut driver = RetryDriver::new(&resolver, &caps, &settings(4));
    let mut commands = CommandQueue::new();

    let err = with_timeout(driver.run(&mut commands, |script| {
        let url = format!("https://example.com/nonce/{}", script.iteration());
        script.fetch(FetchRequest::get(url)).map(|_| ())
    }))
    .await
    .unwrap_err();

    assert!(matches!(err, BridgeError::RetryBudgetExceeded { iterations: 4 }));
    assert!(err.to_string().contains("possible loop"));
    assert_eq!(executed.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn each_driver_starts_with_an_empty_cache() {
    let served = Arc::new(AtomicUsize::new(0));
    let fetch = {
        let served = Arc::clone(&served);
        FakeCapability::new(QueueKind::Fetch, move |_req: &FetchRequest| {
            let n = served.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(HttpResponse::ok(format!("revision {n}")))
        })
    };
    let resolver = resolver_with(fetch);
    let caps = ToolCapabilities::fallback();
    let mut commands = CommandQueue::new();

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
        let driven = with_timeout(driver.run(&mut commands, |script| {
            script.fetch(FetchRequest::get("https://example.com/api")).map(|r| r.body)
        }))
        .await
        .unwrap();
        assert_eq!(driven.iterations, 2);
        bodies.push(driven.value);
    }

    assert_eq!(bodies, vec!["revision 1", "revision 2"], "second call sees the new body");
    assert_eq!(served.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn url_only_patterns_ignore_headers_on_lookup() {
    let fetch = FakeCapability::fetch(200, "solver");
    let executed = fetch.executed();
    let resolver = resolver_with(fetch);
    let caps = ToolCapabilities::fallback();
    let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
    let mut commands = CommandQueue::new();

    let url = "https://github.com/yt-dlp/ejs/releases/download/0.3.0/yt.solver.core.js";
    let driven = with_timeout(driver.run(&mut commands, |script| {
        let request = FetchRequest::get(url).with_header("x-attempt", script.iteration().to_string());
        script.fetch(request).map(|r| r.body)
    }))
    .await
    .unwrap();

    assert_eq!(driven.value, "solver");
    assert_eq!(driven.iterations, 2);
    assert_eq!(executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_resources_abort_the_call() {
    let fetch = FakeCapability::new(QueueKind::Fetch, |_req: &FetchRequest| {
        Err("dns lookup failed".to_string())
    });
    let resolver = resolver_with(fetch);
    let caps = ToolCapabilities::fallback();
    let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
    let mut commands = CommandQueue::new();

    let err = with_timeout(driver.run(&mut commands, |script| {
        script.fetch(FetchRequest::get("https://example.com/x"))
    }))
    .await
    .unwrap_err();

    match err {
        BridgeError::ResourceFailed { kind, message } => {
            assert_eq!(kind, QueueKind::Fetch);
            assert_eq!(message, "dns lookup failed");
        }
        other => panic!("expected ResourceFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn only_the_successful_iteration_commits_tool_commands() {
    let resolver = resolver_with(FakeCapability::fetch(200, "page"));
    let caps = ToolCapabilities::fallback();
    let mut driver = RetryDriver::new(&resolver, &caps, &settings(10));
    let mut commands = CommandQueue::new();

    let driven = with_timeout(driver.run(&mut commands, |script| {
        let probe = script.run_tool(ToolKind::Ffprobe, vec!["-bsfs".to_string()]);
        assert!(probe.stdout.contains("aac_adtstoasc"));

        let args: Vec<String> = ["-i", "in.mp4", "-vn", "out.aac"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = script.run_tool(ToolKind::Ffmpeg, args);
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "Output file: out.aac\n");

        script.fetch(FetchRequest::get("https://example.com/page"))?;
        script.fetch(FetchRequest::get("https://example.com/page2"))?;
        Ok(())
    }))
    .await
    .unwrap();

    assert_eq!(driven.iterations, 3);
    assert_eq!(driven.commands.len(), 1, "introspection is never queued");

    let queued = commands.commands();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].command, ToolKind::Ffmpeg);
    assert_eq!(queued[0].input_path.as_deref(), Some("in.mp4"));
    assert_eq!(queued[0].output_path.as_deref(), Some("out.aac"));
    assert_eq!(queued[0].status, CommandStatus::Pending);
}
