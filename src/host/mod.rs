// src/host/mod.rs

//! The host context: real capabilities and the client side of a worker.

pub mod backend;
pub mod bridge;
pub mod native;

pub use backend::{HostBackend, ProgressReporter};
pub use bridge::HostBridge;
pub use native::NativeHost;
