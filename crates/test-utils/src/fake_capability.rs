use std::fmt;
use std::sync::{Arc, Mutex};

use tapebridge::errors::Result;
use tapebridge::queue::{Capability, ChallengeRequest, DownloadRequest, FetchRequest, HttpResponse};
use tapebridge::types::{BoxFuture, QueueKind};
use tokio::sync::Semaphore;

type Responder<P, O> = Box<dyn Fn(&P) -> std::result::Result<O, String> + Send + Sync>;
type Validator<P> = Box<dyn Fn(&P) -> Result<()> + Send + Sync>;

/// Holds executions back until the test lets them through.
#[derive(Debug, Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
}

impl Gate {
    pub fn closed() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
        }
    }

    /// Let `n` more executions finish.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    async fn pass(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

/// A capability whose answers come from a closure.
///
/// - records every payload it was asked to execute
/// - optionally blocks each execution on a [`Gate`]
pub struct FakeCapability<P, O> {
    kind: QueueKind,
    respond: Responder<P, O>,
    validate: Option<Validator<P>>,
    executed: Arc<Mutex<Vec<P>>>,
    gate: Option<Gate>,
}

impl<P, O> FakeCapability<P, O> {
    pub fn new(
        kind: QueueKind,
        respond: impl Fn(&P) -> std::result::Result<O, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            respond: Box::new(respond),
            validate: None,
            executed: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Shared record of executed payloads, in execution order.
    pub fn executed(&self) -> Arc<Mutex<Vec<P>>> {
        Arc::clone(&self.executed)
    }
}

impl FakeCapability<FetchRequest, HttpResponse> {
    /// Fetch capability answering every request with `status` and `body`.
    pub fn fetch(status: u16, body: &str) -> Self {
        let body = body.to_string();
        let mut cap = Self::new(QueueKind::Fetch, move |_req: &FetchRequest| {
            let mut response = HttpResponse::ok(body.clone());
            response.status = status;
            Ok(response)
        });
        cap.validate = Some(Box::new(FetchRequest::validate));
        cap
    }
}

impl FakeCapability<DownloadRequest, std::path::PathBuf> {
    pub fn download() -> Self {
        let mut cap = Self::new(QueueKind::Download, |req: &DownloadRequest| {
            Ok(req.output_path.clone())
        });
        cap.validate = Some(Box::new(DownloadRequest::validate));
        cap
    }
}

impl FakeCapability<ChallengeRequest, String> {
    pub fn challenge(answer: &str) -> Self {
        let answer = answer.to_string();
        let mut cap = Self::new(QueueKind::Challenge, move |_req: &ChallengeRequest| {
            Ok(answer.clone())
        });
        cap.validate = Some(Box::new(ChallengeRequest::validate));
        cap
    }
}

impl<P, O> Capability for FakeCapability<P, O>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    O: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Payload = P;
    type Output = O;

    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn validate(&self, payload: &P) -> Result<()> {
        match &self.validate {
            Some(check) => check(payload),
            None => Ok(()),
        }
    }

    fn execute(&self, payload: P) -> BoxFuture<'_, std::result::Result<O, String>> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(payload.clone());
            if let Some(gate) = &self.gate {
                gate.pass().await;
            }
            (self.respond)(&payload)
        })
    }
}
