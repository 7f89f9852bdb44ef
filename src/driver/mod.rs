// src/driver/mod.rs

//! Retry-driver loop: bridges a synchronous extraction operation to the
//! asynchronous request queues.
//!
//! The operation is executed repeatedly. Each execution that stops on a
//! missing resource grows the per-call [`ResourceCache`] by one entry, so an
//! operation needing `k` distinct resources finishes in `k + 1` executions.

pub mod cache;
pub mod descriptor;
pub mod resolve;
pub mod retry;
pub mod script;

pub use cache::ResourceCache;
pub use descriptor::Descriptor;
pub use resolve::{QueueResolver, Resolver};
pub use retry::{Driven, RetryDriver};
pub use script::{Interrupt, ResourceRequest, Script, StagedCommand, Step};
