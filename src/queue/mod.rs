// src/queue/mod.rs

//! Request queues and their asynchronous processors.
//!
//! The three payload families (network fetch, download-to-file,
//! challenge-code evaluation) share one state machine: [`RequestQueue`],
//! parameterised by a [`Capability`] that performs the real work.
//!
//! - [`item`] holds the tracked unit of work.
//! - [`payload`] defines the kind-specific payloads.
//! - [`request_queue`] owns enqueue / poll / wait and the drain task.
//! - [`sweeper`] force-fails stale items on a fixed period.

pub mod capability;
pub mod item;
pub mod payload;
pub mod request_queue;
pub mod sweeper;

pub use capability::Capability;
pub use item::QueueItem;
pub use payload::{ChallengeRequest, DownloadRequest, FetchRequest, HttpResponse};
pub use request_queue::{ItemOf, QueueTiming, RequestQueue};
pub use sweeper::{Sweepable, SweeperHandle, TimeoutSweeper};
