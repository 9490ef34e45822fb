use std::fmt;

use crate::{bridge::Bridge, envelope::Payload};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where background code is loaded from. Opaque to the control plane.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EntryPoint(String);

impl EntryPoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A running background environment.
///
/// Owned exclusively by the manager's background thread; every method is
/// called from there, one at a time, in the order the host issued them.
#[async_trait::async_trait]
pub trait Runtime: Send + 'static {
    /// Deliver a host message. Failures are reported through `on_error`.
    async fn post_message(&mut self, payload: Payload) -> core::result::Result<(), BoxError>;

    /// Release the environment. Called once, before the runtime is dropped.
    async fn shutdown(&mut self) {}
}

/// Builds background environments for the manager.
///
/// The [`Bridge`] is the runtime's only way back to the host and to sandboxes;
/// implementations keep it for as long as they emit messages.
#[async_trait::async_trait]
pub trait RuntimeFactory: Send + Sync + 'static {
    async fn create(
        &self,
        entry: &EntryPoint,
        bridge: Bridge,
    ) -> core::result::Result<Box<dyn Runtime>, BoxError>;
}
