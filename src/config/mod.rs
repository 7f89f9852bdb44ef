// src/config/mod.rs

//! Configuration loading and validation for tapebridge.
//!
//! - `model.rs` defines the TOML-backed raw model and the validated form.
//! - `loader.rs` reads a config file from disk.
//! - `validate.rs` turns raw duration strings into typed values and checks limits.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, DriverSection, HostSection, LogSection, QueueSection, RawConfigFile,
    RawQueueSection, RawRpcSection, RpcSection,
};
pub use validate::parse_duration;
