// src/protocol/mod.rs

//! Cross-context message protocol.
//!
//! Host and worker share no memory; they talk only through the envelopes
//! in [`message`]. Request/response pairs are matched by id through a
//! [`Correlator`].

pub mod correlator;
pub mod message;

pub use correlator::Correlator;
pub use message::{HostCall, HostReply, Reply, ToHost, ToWorker, WorkerReply, WorkerRequest};
