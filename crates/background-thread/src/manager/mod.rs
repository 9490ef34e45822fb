//! The background manager.
//!
//! [`BackgroundManager`] is a cloneable handle to one background runtime and
//! its routing state. Construct it once per process and pass it to whoever
//! needs it; clones share the same runtime.
//!
//! Lifecycle calls return immediately. Runtime construction, delivery into the
//! runtime and callback invocation all happen on a dedicated thread, in the
//! order the calls were made. Use [`BackgroundManager::wait_settled`] or
//! [`BackgroundManager::flush`] to observe their effects.

mod shared;
mod worker;

use std::{io, sync::Arc};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub use self::shared::RuntimeState;
pub(crate) use self::shared::{Command, Shared};
use self::worker::Worker;
use crate::{
    callbacks::{ErrorCallback, MessageCallback},
    config::ManagerConfig,
    envelope::{Payload, SandboxId},
    error::{Error, Result},
    registry::SandboxDelegate,
    runtime::RuntimeFactory,
};

#[derive(Clone)]
pub struct BackgroundManager {
    inner: Arc<Inner>,
}

struct Inner {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    config: ManagerConfig,
}

impl BackgroundManager {
    /// Spawn the background thread. No runtime is created until
    /// [`start`](Self::start).
    pub fn new(factory: impl RuntimeFactory, config: ManagerConfig) -> Result<Self> {
        Self::with_factory(Arc::new(factory), config)
    }

    pub fn with_factory(factory: Arc<dyn RuntimeFactory>, config: ManagerConfig) -> Result<Self> {
        if config.thread_name.contains('\0') {
            return Err(Error::InvalidThreadName(config.thread_name));
        }

        let shared = Arc::new(Shared::new());
        let (commands, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(Arc::clone(&shared), factory, commands.downgrade());

        // The runtime is built and dropped on the background thread only, so
        // construction is safe from inside another async runtime.
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
        std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => {
                        let _ = ready_tx.send(Ok(()));
                        runtime
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                runtime.block_on(worker.run(rx));
            })?;
        ready_rx
            .recv()
            .map_err(|_| io::Error::other("background thread exited during startup"))??;

        info!(thread_name = %config.thread_name, "Background manager created");
        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                commands,
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Start the runtime from `entry_url`, or the configured default.
    ///
    /// Does nothing while a runtime is starting or running. Construction
    /// failures are reported through `on_error` and leave the manager
    /// [`Stopped`](RuntimeState::Stopped).
    pub fn start(&self, entry_url: Option<&str>) {
        let Some(generation) = self.inner.shared.begin_start() else {
            debug!("Background runtime already live; start ignored");
            return;
        };
        let entry = self.inner.config.entry_point(entry_url);
        debug!(%entry, generation, "Queued background runtime start");
        self.send(Command::Start { generation, entry });
    }

    /// Tear down the runtime and forget every registered sandbox.
    ///
    /// Messages already handed to the runtime may or may not be processed.
    pub fn stop(&self) {
        let Some(generation) = self.inner.shared.stop() else {
            return;
        };
        debug!(generation, "Queued background runtime stop");
        self.send(Command::Stop { generation });
    }

    /// Send `payload` to the background runtime.
    ///
    /// Dropped unless the runtime is running; nothing is queued for later.
    pub fn post_message(&self, payload: &str) {
        let Some(generation) = self.inner.shared.running_generation() else {
            debug!(
                state = self.state().as_str(),
                "Background runtime not running; message dropped"
            );
            return;
        };
        match Payload::new(payload) {
            Ok(payload) => self.send(Command::Post {
                generation,
                payload,
            }),
            Err(err) => {
                warn!(error = %err, "Rejected message for background runtime");
                self.send(Command::Error {
                    generation,
                    message: err.to_string(),
                });
            }
        }
    }

    /// Deliver `payload` to the sandbox registered as `target`.
    ///
    /// Returns whether the sandbox accepted it. Unknown targets, a runtime that
    /// is not running and malformed payloads all yield `false`.
    pub fn route_message(&self, payload: &str, target: &str) -> bool {
        if self.inner.shared.running_generation().is_none() {
            debug!(
                sandbox_id = target,
                state = self.state().as_str(),
                "Background runtime not running; routed message dropped"
            );
            return false;
        }
        match Payload::new(payload) {
            Ok(payload) => self.inner.shared.registry.route(target, &payload),
            Err(err) => {
                warn!(sandbox_id = target, error = %err, "Rejected routed message");
                false
            }
        }
    }

    /// Register `delegate` under `id`, replacing any previous registration.
    pub fn register_sandbox(&self, id: SandboxId, delegate: Arc<dyn SandboxDelegate>) {
        self.inner.shared.registry.register(id, delegate);
    }

    /// Returns whether `id` was registered.
    pub fn unregister_sandbox(&self, id: &str) -> bool {
        self.inner.shared.registry.unregister(id)
    }

    pub fn set_on_message_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        let callback: MessageCallback = Arc::new(callback);
        self.inner.shared.callbacks.set_on_message(callback);
    }

    pub fn set_on_error_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        let callback: ErrorCallback = Arc::new(callback);
        self.inner.shared.callbacks.set_on_error(callback);
    }

    pub fn clear_callbacks(&self) {
        self.inner.shared.callbacks.clear();
    }

    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.inner.shared.state()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state() == RuntimeState::Running
    }

    /// Wait until the manager is not [`Starting`](RuntimeState::Starting).
    pub async fn wait_settled(&self) -> RuntimeState {
        let mut rx = self.inner.shared.subscribe();
        match rx.wait_for(|state| *state != RuntimeState::Starting).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Wait until everything queued for the background thread before this
    /// call has been processed.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Flush(done)).is_ok() {
            let _ = rx.await;
        }
    }

    fn send(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            warn!("Background thread is gone; command dropped");
        }
    }
}
