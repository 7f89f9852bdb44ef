// tests/request_queue.rs

use std::sync::Arc;
use std::time::Duration;

use tapebridge::errors::BridgeError;
use tapebridge::queue::{
    FetchRequest, HttpResponse, ItemOf, QueueTiming, RequestQueue, Sweepable, TimeoutSweeper,
};
use tapebridge::types::{ItemStatus, QueueKind};
use tapebridge_test_utils::fake_capability::{FakeCapability, Gate};
use tapebridge_test_utils::{init_tracing, with_timeout};

type FakeFetch = FakeCapability<FetchRequest, HttpResponse>;

fn timing(poll_ms: u64, timeout_ms: u64) -> QueueTiming {
    QueueTiming {
        poll_interval: Duration::from_millis(poll_ms),
        timeout: Duration::from_millis(timeout_ms),
    }
}

async fn poll_until_settled(queue: &RequestQueue<FakeFetch>, id: u64) -> ItemOf<FakeFetch> {
    loop {
        if let Some(item) = queue.poll(id) {
            return item;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn completed_item_is_observed_exactly_once() {
    init_tracing();

    let gate = Gate::closed();
    let queue = RequestQueue::new(
        FakeCapability::fetch(200, "hello").gated(gate.clone()),
        timing(10, 5_000),
    );

    let id = queue.enqueue(FetchRequest::get("https://example.com/a")).unwrap();
    assert!(queue.poll(id).is_none(), "in-flight item must not be returned");
    assert!(queue.is_pending(id));

    gate.release(1);
    let item = with_timeout(poll_until_settled(&queue, id)).await;

    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.result.as_ref().map(|r| r.status), Some(200));
    assert!(queue.poll(id).is_none(), "a consumed item is gone");
    assert!(!queue.is_pending(id));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn wait_synthesises_a_timeout_when_budget_is_spent() {
    init_tracing();

    let queue = RequestQueue::new(
        FakeCapability::fetch(200, "never").gated(Gate::closed()),
        timing(5, 30),
    );
    let id = queue.enqueue(FetchRequest::get("https://example.com/slow")).unwrap();

    let item = with_timeout(queue.wait(id)).await.unwrap();
    assert_eq!(item.status, ItemStatus::Error);
    assert!(item.error.unwrap().contains("timed out"));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn wait_on_unknown_id_is_rejected() {
    let queue = RequestQueue::new(FakeCapability::fetch(200, ""), timing(5, 100));
    let err = queue.wait(42).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::ItemNotFound {
            kind: QueueKind::Fetch,
            id: 42
        }
    ));
}

#[tokio::test]
async fn invalid_payloads_are_never_queued() {
    let queue = RequestQueue::new(FakeCapability::fetch(200, ""), timing(5, 100));

    let err = queue.enqueue(FetchRequest::get("ftp://example.com/file")).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidPayload { kind: QueueKind::Fetch, .. }));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn items_are_processed_in_enqueue_order_and_none_are_stranded() {
    init_tracing();

    let capability = FakeCapability::fetch(200, "ok");
    let executed = capability.executed();
    let queue = RequestQueue::new(capability, timing(5, 5_000));

    let ids: Vec<u64> = (0..5)
        .map(|n| {
            queue
                .enqueue(FetchRequest::get(format!("https://example.com/{n}")))
                .unwrap()
        })
        .collect();

    for id in &ids {
        let item = with_timeout(queue.wait(*id)).await.unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
    }

    let urls: Vec<String> = executed.lock().unwrap().iter().map(|r| r.url.clone()).collect();
    let expected: Vec<String> = (0..5).map(|n| format!("https://example.com/{n}")).collect();
    assert_eq!(urls, expected, "each item executed once, in id order");
}

#[tokio::test]
async fn capability_failure_is_recorded_on_the_item() {
    let queue = RequestQueue::new(
        FakeFetch::new(QueueKind::Fetch, |_req: &FetchRequest| {
            Err("connection refused".to_string())
        }),
        timing(5, 1_000),
    );
    let id = queue.enqueue(FetchRequest::get("https://example.com/down")).unwrap();

    let item = with_timeout(queue.wait(id)).await.unwrap();
    assert_eq!(item.status, ItemStatus::Error);
    assert_eq!(item.error.as_deref(), Some("connection refused"));
}

#[tokio::test]
async fn panicking_capability_does_not_wedge_the_queue() {
    init_tracing();

    let queue = RequestQueue::new(
        FakeFetch::new(QueueKind::Fetch, |req: &FetchRequest| {
            if req.url.ends_with("/boom") {
                panic!("capability blew up");
            }
            Ok(HttpResponse::ok("fine"))
        }),
        timing(5, 2_000),
    );

    let id = queue.enqueue(FetchRequest::get("https://example.com/boom")).unwrap();
    let item = with_timeout(queue.wait(id)).await.unwrap();
    assert_eq!(item.status, ItemStatus::Error);
    assert_eq!(item.error.as_deref(), Some("fetch processing aborted"));

    let id = queue.enqueue(FetchRequest::get("https://example.com/after")).unwrap();
    let item = with_timeout(queue.wait(id)).await.unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.result.map(|r| r.body).as_deref(), Some("fine"));
}

#[tokio::test]
async fn sweeper_fails_idle_items() {
    init_tracing();

    let queue = RequestQueue::new(
        FakeCapability::fetch(200, "never").gated(Gate::closed()),
        timing(5, 20),
    );
    let id = queue.enqueue(FetchRequest::get("https://example.com/stuck")).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let sweeper = TimeoutSweeper::new(vec![Arc::new(queue.clone()) as Arc<dyn Sweepable>]);
    assert_eq!(sweeper.sweep_now(), 1);

    let item = queue.poll(id).expect("swept item is terminal");
    assert_eq!(item.status, ItemStatus::Error);
    assert_eq!(item.error.as_deref(), Some("fetch request timed out after 20ms"));
}

#[tokio::test]
async fn spawned_sweeper_runs_until_stopped() {
    let queue = RequestQueue::new(
        FakeCapability::fetch(200, "never").gated(Gate::closed()),
        timing(5, 20),
    );
    let id = queue.enqueue(FetchRequest::get("https://example.com/stuck")).unwrap();

    let handle = TimeoutSweeper::new(vec![Arc::new(queue.clone()) as Arc<dyn Sweepable>])
        .spawn(Duration::from_millis(10));
    assert!(handle.is_running());

    let item = with_timeout(poll_until_settled(&queue, id)).await;
    assert_eq!(item.status, ItemStatus::Error);

    handle.stop().await;
}

#[tokio::test]
async fn dropping_the_handle_ends_the_sweeper_task() {
    let queue = RequestQueue::new(FakeCapability::fetch(200, ""), timing(5, 1_000));
    let swept: Arc<dyn Sweepable> = Arc::new(queue);

    let handle = TimeoutSweeper::new(vec![Arc::clone(&swept)]).spawn(Duration::from_secs(60));
    assert_eq!(Arc::strong_count(&swept), 2);

    drop(handle);
    with_timeout(async {
        while Arc::strong_count(&swept) > 1 {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

#[tokio::test]
async fn progress_keeps_processing_items_alive() {
    let gate = Gate::closed();
    let queue = RequestQueue::new(
        FakeCapability::fetch(200, "done").gated(gate.clone()),
        timing(5, 40),
    );
    let id = queue.enqueue(FetchRequest::get("https://example.com/big")).unwrap();

    with_timeout(async {
        while queue.touch_processing() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.touch_processing(), 1);
    }
    assert_eq!(queue.sweep(tokio::time::Instant::now()), 0);

    gate.release(1);
    let item = with_timeout(poll_until_settled(&queue, id)).await;
    assert_eq!(item.status, ItemStatus::Completed);
}
