// src/command/mod.rs

//! Deferred external tool execution.
//!
//! The scripting phase cannot spawn the conversion tool, so it only records
//! what it wants run. [`CommandQueue::execute_queued`] replays those records
//! sequentially once the scripting phase is over.

pub mod capabilities;
pub mod model;
pub mod queue;

pub use capabilities::ToolCapabilities;
pub use model::{Command, PathHints};
pub use queue::{CommandQueue, ToolRunner};
