use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::shared::{Command, Shared};
use crate::{
    bridge::Bridge,
    envelope::Payload,
    error::Error,
    runtime::{EntryPoint, Runtime, RuntimeFactory},
};

struct ActiveRuntime {
    generation: u64,
    runtime: Box<dyn Runtime>,
}

/// The background execution context. Owns the live runtime and performs every
/// state transition and callback invocation that follows from a command.
pub(super) struct Worker {
    shared: Arc<Shared>,
    factory: Arc<dyn RuntimeFactory>,
    commands: mpsc::WeakUnboundedSender<Command>,
    active: Option<ActiveRuntime>,
}

impl Worker {
    pub(super) fn new(
        shared: Arc<Shared>,
        factory: Arc<dyn RuntimeFactory>,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            shared,
            factory,
            commands,
            active: None,
        }
    }

    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Start { generation, entry } => self.start(generation, entry).await,
                Command::Post {
                    generation,
                    payload,
                } => self.post(generation, payload).await,
                Command::Stop { generation } => self.teardown(generation).await,
                Command::Message {
                    generation,
                    payload,
                } => self.deliver_to_host(generation, &payload),
                Command::Error {
                    generation,
                    message,
                } => {
                    if self.shared.is_current(generation) {
                        self.report_error(&message);
                    }
                }
                Command::Fatal {
                    generation,
                    message,
                } => self.fatal(generation, &message).await,
                Command::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        if let Some(mut active) = self.active.take() {
            active.runtime.shutdown().await;
        }
        debug!("Background command channel closed");
    }

    async fn start(&mut self, generation: u64, entry: EntryPoint) {
        if !self.shared.is_current(generation) {
            debug!(generation, "Skipping superseded start");
            return;
        }
        if let Some(mut previous) = self.active.take() {
            previous.runtime.shutdown().await;
        }

        info!(%entry, generation, "Starting background runtime");
        let bridge = Bridge::new(generation, Arc::downgrade(&self.shared), self.commands.clone());
        match self.factory.create(&entry, bridge).await {
            Ok(mut runtime) => {
                if self.shared.finish_start(generation) {
                    info!(generation, "Background runtime running");
                    self.active = Some(ActiveRuntime {
                        generation,
                        runtime,
                    });
                } else {
                    debug!(generation, "Stopped during construction; discarding runtime");
                    runtime.shutdown().await;
                }
            }
            Err(err) => {
                let err = Error::Start(err);
                if self.shared.fail_start(generation) {
                    warn!(%entry, generation, error = %err, "Background runtime failed to start");
                    self.report_error(&err.to_string());
                } else {
                    debug!(generation, error = %err, "Superseded start failed");
                }
            }
        }
    }

    async fn post(&mut self, generation: u64, payload: Payload) {
        let Some(active) = self
            .active
            .as_mut()
            .filter(|active| active.generation == generation)
        else {
            debug!(generation, "Dropping message for a runtime that is gone");
            return;
        };

        trace!(generation, len = payload.as_str().len(), "Delivering message");
        if let Err(err) = active.runtime.post_message(payload).await {
            let err = Error::Runtime(err);
            warn!(generation, error = %err, "Background runtime rejected message");
            self.report_error(&err.to_string());
        }
    }

    async fn teardown(&mut self, generation: u64) {
        let Some(mut active) = self
            .active
            .take_if(|active| active.generation == generation)
        else {
            return;
        };
        active.runtime.shutdown().await;
        info!(generation, "Background runtime stopped");
    }

    async fn fatal(&mut self, generation: u64, message: &str) {
        if !self.shared.stop_generation(generation) {
            debug!(generation, reason = message, "Ignoring fatal error from stale runtime");
            return;
        }
        warn!(generation, reason = message, "Background runtime failed");
        self.teardown(generation).await;
        self.report_error(message);
    }

    fn deliver_to_host(&self, generation: u64, payload: &Payload) {
        if !self.shared.is_current(generation) {
            trace!(generation, "Dropping message from stale runtime");
            return;
        }
        if !self.shared.callbacks.emit_message(payload.as_str()) {
            debug!(generation, "No on_message callback; message dropped");
        }
    }

    fn report_error(&self, message: &str) {
        if !self.shared.callbacks.emit_error(message) {
            debug!(reason = message, "No on_error callback; error dropped");
        }
    }
}
