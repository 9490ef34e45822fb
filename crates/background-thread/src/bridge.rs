//! The runtime's side of the control plane.
//!
//! A [`Bridge`] is handed to a [`Runtime`](crate::Runtime) when it is created.
//! Messages and errors sent through it are queued onto the manager's
//! background thread, where the host callbacks run. A bridge belongs to one
//! runtime: once that runtime is stopped or replaced, whatever it still emits
//! is discarded. Bridges hold no strong reference to the manager.

use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    envelope::{Origin, Payload, WireEnvelope},
    manager::{Command, Shared},
};

#[derive(Clone)]
pub struct Bridge {
    generation: u64,
    shared: Weak<Shared>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Bridge {
    pub(crate) const fn new(
        generation: u64,
        shared: Weak<Shared>,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            generation,
            shared,
            commands,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the runtime this bridge belongs to is still the live one.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.is_current(self.generation))
    }

    /// Emit a message addressed to the host (`on_message`).
    ///
    /// Returns whether it was queued. Malformed JSON is reported through
    /// `on_error` instead.
    pub fn post_host_message(&self, payload: &str) -> bool {
        match Payload::new(payload) {
            Ok(payload) => self.emit(payload),
            Err(err) => {
                self.report_error(format!("background runtime emitted {err}"));
                false
            }
        }
    }

    /// Deliver a message to a sandbox. Returns whether the sandbox accepted it.
    pub fn route_message(&self, payload: &str, target: &str) -> bool {
        match Payload::new(payload) {
            Ok(payload) => self.route(&payload, target),
            Err(err) => {
                warn!(sandbox_id = target, error = %err, "Rejected routed message from runtime");
                false
            }
        }
    }

    /// Handle one [`WireEnvelope`] line: route it to its target sandbox, or
    /// post it to the host when it has none.
    pub fn dispatch(&self, line: &str) -> bool {
        let envelope = match WireEnvelope::decode(line) {
            Ok(wire) => wire.into_envelope(Origin::Background),
            Err(err) => {
                self.report_error(format!("background runtime emitted {err}"));
                return false;
            }
        };
        match envelope.target {
            Some(target) => self.route(&envelope.payload, target.as_str()),
            None => self.emit(envelope.payload),
        }
    }

    /// Report a recoverable error (`on_error`). The runtime keeps running.
    pub fn report_error(&self, message: impl Into<String>) {
        self.send(Command::Error {
            generation: self.generation,
            message: message.into(),
        });
    }

    /// Report that the runtime can no longer run. The manager reports the
    /// error, tears the runtime down and moves to `Stopped`.
    pub fn report_fatal(&self, message: impl Into<String>) {
        self.send(Command::Fatal {
            generation: self.generation,
            message: message.into(),
        });
    }

    fn emit(&self, payload: Payload) -> bool {
        self.send(Command::Message {
            generation: self.generation,
            payload,
        })
    }

    fn route(&self, payload: &Payload, target: &str) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        if !shared.is_current(self.generation) {
            debug!(
                generation = self.generation,
                sandbox_id = target,
                "Dropping routed message from stale runtime"
            );
            return false;
        }
        shared.registry.route(target, payload)
    }

    fn send(&self, command: Command) -> bool {
        self.commands
            .upgrade()
            .is_some_and(|commands| commands.send(command).is_ok())
    }
}
