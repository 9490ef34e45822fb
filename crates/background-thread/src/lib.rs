//! Control plane for a long-lived background script environment.
//!
//! A [`BackgroundManager`] owns at most one background [`Runtime`] on a
//! dedicated thread and ferries JSON messages between the host, the
//! background environment and any registered sandboxes:
//!
//! 1. Construct a manager with a [`RuntimeFactory`] and a [`ManagerConfig`].
//! 2. Install `on_message` / `on_error` callbacks.
//! 3. [`start`](BackgroundManager::start) the runtime, then
//!    [`post_message`](BackgroundManager::post_message) to it or
//!    [`route_message`](BackgroundManager::route_message) to a sandbox.
//!
//! Runtimes talk back through the [`Bridge`] they are given at construction.

pub mod bridge;
pub mod callbacks;
pub mod config;
pub mod envelope;
pub mod error;
pub mod manager;
#[cfg(feature = "process")]
pub mod process;
pub mod registry;
pub mod runtime;
pub mod secure_params;

/// Trace target for output produced by the background environment itself.
pub const TRACE_TARGET_RUNTIME: &str = "background_thread::runtime";

pub use bridge::Bridge;
pub use callbacks::{CallbackSlots, ErrorCallback, MessageCallback};
pub use config::ManagerConfig;
pub use envelope::{MessageEnvelope, Origin, Payload, SandboxId, WireEnvelope};
pub use error::{Error, Result};
pub use manager::{BackgroundManager, RuntimeState};
#[cfg(feature = "process")]
pub use process::ProcessRuntimeFactory;
pub use registry::{SandboxDelegate, SandboxRegistry};
pub use runtime::{BoxError, EntryPoint, Runtime, RuntimeFactory};
pub use secure_params::{InitParams, SecureParamsProvider, StaticParamsProvider};
