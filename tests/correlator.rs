// tests/correlator.rs

use std::sync::Arc;
use std::time::Duration;

use tapebridge::errors::BridgeError;
use tapebridge::protocol::Correlator;
use tapebridge_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn silent_peer_times_out_and_late_reply_is_discarded() {
    init_tracing();

    let correlator: Correlator<String> = Correlator::new("capability");
    let mut sent = None;

    let err = correlator
        .call("capability http_request", Duration::from_millis(20), |id| {
            sent = Some(id);
            async { Ok(()) }
        })
        .await
        .unwrap_err();

    match err {
        BridgeError::Timeout { what, after } => {
            assert_eq!(what, "capability http_request");
            assert_eq!(after, Duration::from_millis(20));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert_eq!(correlator.pending(), 0);

    let id = sent.unwrap();
    assert!(!correlator.resolve(id, Ok("late".to_string())));
}

#[tokio::test]
async fn remote_failures_keep_their_message() {
    let correlator = Arc::new(Correlator::<String>::new("sandbox"));

    let caller = {
        let correlator = Arc::clone(&correlator);
        tokio::spawn(async move {
            correlator
                .call("sandbox execute", Duration::from_secs(5), |_| async { Ok(()) })
                .await
        })
    };

    with_timeout(async {
        while correlator.pending() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await;

    assert!(correlator.resolve(1, Err("Sandbox execution timed out".to_string())));
    let err = with_timeout(caller).await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Remote(ref m) if m == "Sandbox execution timed out"));
}

#[tokio::test]
async fn fail_all_settles_every_waiter() {
    let correlator = Arc::new(Correlator::<u32>::new("worker"));

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move {
                correlator
                    .call("message initialize", Duration::from_secs(5), |_| async { Ok(()) })
                    .await
            })
        })
        .collect();

    with_timeout(async {
        while correlator.pending() < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await;

    assert_eq!(correlator.fail_all("worker terminated"), 3);
    for caller in callers {
        let err = with_timeout(caller).await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::ContextClosed(ref m) if m == "worker terminated"));
    }
    assert_eq!(correlator.pending(), 0);
}

#[tokio::test]
async fn send_failure_releases_the_slot() {
    let correlator: Correlator<()> = Correlator::new("worker");

    let err = correlator
        .call("message get_queue", Duration::from_secs(1), |_| async {
            Err(BridgeError::ContextClosed("worker terminated".to_string()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::ContextClosed(_)));
    assert_eq!(correlator.pending(), 0);
}
