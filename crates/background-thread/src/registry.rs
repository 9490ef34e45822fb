use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::{
    callbacks::contain_panic,
    envelope::{Payload, SandboxId},
};

/// Capability a sandbox registers to receive messages addressed to it.
///
/// Returns whether the sandbox accepted the message, not whether it has
/// finished processing it.
pub trait SandboxDelegate: Send + Sync + 'static {
    fn receive(&self, payload: &Payload) -> bool;
}

impl<F> SandboxDelegate for F
where
    F: Fn(&Payload) -> bool + Send + Sync + 'static,
{
    fn receive(&self, payload: &Payload) -> bool {
        self(payload)
    }
}

/// Sandbox id → delegate, with exact-match unicast routing.
#[derive(Default)]
pub struct SandboxRegistry {
    sandboxes: DashMap<SandboxId, Arc<dyn SandboxDelegate>>,
}

impl SandboxRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `delegate` under `id`, replacing any previous delegate.
    pub fn register(&self, id: SandboxId, delegate: Arc<dyn SandboxDelegate>) {
        debug!(sandbox_id = %id, "Registering sandbox");
        if self.sandboxes.insert(id, delegate).is_some() {
            debug!("Replaced previous sandbox delegate");
        }
    }

    /// Remove `id`. Returns whether it was registered.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.sandboxes.remove(id).is_some();
        debug!(sandbox_id = id, removed, "Unregistering sandbox");
        removed
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sandboxes.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sandboxes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sandboxes.is_empty()
    }

    pub fn clear(&self) {
        self.sandboxes.clear();
    }

    /// Deliver `payload` to the sandbox registered as `target`.
    ///
    /// The delegate runs after the map shard is unlocked, so it may register,
    /// unregister or route itself.
    pub fn route(&self, target: &str, payload: &Payload) -> bool {
        let Some(delegate) = self
            .sandboxes
            .get(target)
            .map(|entry| Arc::clone(entry.value()))
        else {
            trace!(sandbox_id = target, "No sandbox registered for target");
            return false;
        };
        // A panicking delegate counts as a rejection.
        let accepted =
            contain_panic("sandbox delegate", || delegate.receive(payload)).unwrap_or(false);
        trace!(sandbox_id = target, accepted, "Routed message to sandbox");
        accepted
    }
}
