// src/driver/resolve.rs

use std::path::PathBuf;

use crate::errors::{BridgeError, Result};
use crate::queue::{
    Capability, ChallengeRequest, DownloadRequest, FetchRequest, HttpResponse, RequestQueue,
};
use crate::types::{BoxFuture, QueueKind};

/// Obtains resources on behalf of the retry driver.
pub trait Resolver: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<HttpResponse>>;

    fn download(&self, request: DownloadRequest) -> BoxFuture<'_, Result<PathBuf>>;

    fn challenge(&self, request: ChallengeRequest) -> BoxFuture<'_, Result<String>>;
}

/// Resolver backed by the three request queues: enqueue, then wait.
pub struct QueueResolver<F, D, J>
where
    F: Capability<Payload = FetchRequest, Output = HttpResponse>,
    D: Capability<Payload = DownloadRequest, Output = PathBuf>,
    J: Capability<Payload = ChallengeRequest, Output = String>,
{
    pub fetch: RequestQueue<F>,
    pub download: RequestQueue<D>,
    pub challenge: RequestQueue<J>,
}

impl<F, D, J> Clone for QueueResolver<F, D, J>
where
    F: Capability<Payload = FetchRequest, Output = HttpResponse>,
    D: Capability<Payload = DownloadRequest, Output = PathBuf>,
    J: Capability<Payload = ChallengeRequest, Output = String>,
{
    fn clone(&self) -> Self {
        Self {
            fetch: self.fetch.clone(),
            download: self.download.clone(),
            challenge: self.challenge.clone(),
        }
    }
}

async fn enqueue_and_wait<C: Capability>(
    queue: &RequestQueue<C>,
    payload: C::Payload,
) -> Result<C::Output> {
    let id = queue.enqueue(payload)?;
    let item = queue.wait(id).await?;
    item.into_outcome().map_err(|message| failure(queue.kind(), message))
}

fn failure(kind: QueueKind, message: String) -> BridgeError {
    BridgeError::ResourceFailed { kind, message }
}

impl<F, D, J> Resolver for QueueResolver<F, D, J>
where
    F: Capability<Payload = FetchRequest, Output = HttpResponse>,
    D: Capability<Payload = DownloadRequest, Output = PathBuf>,
    J: Capability<Payload = ChallengeRequest, Output = String>,
{
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(enqueue_and_wait(&self.fetch, request))
    }

    fn download(&self, request: DownloadRequest) -> BoxFuture<'_, Result<PathBuf>> {
        Box::pin(enqueue_and_wait(&self.download, request))
    }

    fn challenge(&self, request: ChallengeRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(enqueue_and_wait(&self.challenge, request))
    }
}
