// src/queue/capability.rs

//! Pluggable capability abstraction.
//!
//! A request queue does not know how its work is actually performed. It
//! hands each pending payload to a `Capability` exactly once and records the
//! outcome. Production capabilities route over the cross-context protocol to
//! the host; tests provide in-process fakes.

use std::fmt;

use crate::errors::Result;
use crate::types::{BoxFuture, QueueKind};

pub trait Capability: Send + Sync + 'static {
    type Payload: Clone + fmt::Debug + Send + Sync + 'static;
    type Output: Clone + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> QueueKind;

    /// Reject malformed payloads before they are queued.
    fn validate(&self, _payload: &Self::Payload) -> Result<()> {
        Ok(())
    }

    /// Perform the work. Failures are reported as human-readable strings and
    /// recorded on the item; they never abort a processing pass.
    fn execute(
        &self,
        payload: Self::Payload,
    ) -> BoxFuture<'_, std::result::Result<Self::Output, String>>;
}
