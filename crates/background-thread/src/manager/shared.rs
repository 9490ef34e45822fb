use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use crate::{
    callbacks::CallbackSlots,
    envelope::Payload,
    registry::SandboxRegistry,
    runtime::EntryPoint,
};

/// Lifecycle of the background runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    Uninitialized,
    Starting,
    Running,
    Stopped,
}

impl RuntimeState {
    /// Whether a runtime exists or is being constructed.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Work for the background thread, processed strictly in order.
pub(crate) enum Command {
    Start {
        generation: u64,
        entry: EntryPoint,
    },
    Post {
        generation: u64,
        payload: Payload,
    },
    Stop {
        generation: u64,
    },
    Message {
        generation: u64,
        payload: Payload,
    },
    Error {
        generation: u64,
        message: String,
    },
    Fatal {
        generation: u64,
        message: String,
    },
    Flush(oneshot::Sender<()>),
}

struct Lifecycle {
    state: RuntimeState,
    /// Bumped on every `start`; runtimes and their bridges are tagged with it.
    generation: u64,
}

/// State shared by the manager handle, the background thread and bridges.
pub(crate) struct Shared {
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<RuntimeState>,
    pub(crate) registry: SandboxRegistry,
    pub(crate) callbacks: CallbackSlots,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (state_tx, _) = watch::channel(RuntimeState::Uninitialized);
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: RuntimeState::Uninitialized,
                generation: 0,
            }),
            state_tx,
            registry: SandboxRegistry::new(),
            callbacks: CallbackSlots::default(),
        }
    }

    pub(crate) fn state(&self) -> RuntimeState {
        self.lifecycle.lock().state
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, lifecycle: &mut Lifecycle, state: RuntimeState) {
        lifecycle.state = state;
        self.state_tx.send_replace(state);
    }

    /// Generation of the runtime currently accepting messages.
    pub(crate) fn running_generation(&self) -> Option<u64> {
        let lifecycle = self.lifecycle.lock();
        (lifecycle.state == RuntimeState::Running).then_some(lifecycle.generation)
    }

    /// Whether `generation` still owns the lifecycle.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        let lifecycle = self.lifecycle.lock();
        lifecycle.generation == generation && lifecycle.state.is_live()
    }

    /// `Uninitialized | Stopped → Starting`. Returns the new generation, or
    /// `None` if a runtime is already live.
    pub(crate) fn begin_start(&self) -> Option<u64> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_live() {
            return None;
        }
        lifecycle.generation += 1;
        self.set_state(&mut lifecycle, RuntimeState::Starting);
        Some(lifecycle.generation)
    }

    /// `Starting → Running` if `generation` was not superseded meanwhile.
    pub(crate) fn finish_start(&self, generation: u64) -> bool {
        self.settle_start(generation, RuntimeState::Running)
    }

    /// `Starting → Stopped` if `generation` was not superseded meanwhile.
    pub(crate) fn fail_start(&self, generation: u64) -> bool {
        self.settle_start(generation, RuntimeState::Stopped)
    }

    fn settle_start(&self, generation: u64, state: RuntimeState) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation || lifecycle.state != RuntimeState::Starting {
            return false;
        }
        self.set_state(&mut lifecycle, state);
        true
    }

    /// `Starting | Running → Stopped`, clearing the registry. Returns the
    /// generation that was stopped.
    pub(crate) fn stop(&self) -> Option<u64> {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.state.is_live() {
            return None;
        }
        self.set_state(&mut lifecycle, RuntimeState::Stopped);
        self.registry.clear();
        Some(lifecycle.generation)
    }

    /// Like [`Shared::stop`], but only if `generation` is still current.
    pub(crate) fn stop_generation(&self, generation: u64) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation || !lifecycle.state.is_live() {
            return false;
        }
        self.set_state(&mut lifecycle, RuntimeState::Stopped);
        self.registry.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_refused_while_live() {
        let shared = Shared::new();
        assert_eq!(shared.begin_start(), Some(1));
        assert_eq!(shared.begin_start(), None);
        assert!(shared.finish_start(1));
        assert_eq!(shared.begin_start(), None);
        assert_eq!(shared.state(), RuntimeState::Running);
    }

    #[test]
    fn stop_from_uninitialized_is_a_noop() {
        let shared = Shared::new();
        assert_eq!(shared.stop(), None);
        assert_eq!(shared.state(), RuntimeState::Uninitialized);
    }

    #[test]
    fn superseded_start_cannot_settle() {
        let shared = Shared::new();
        let first = shared.begin_start().expect("first start");
        assert_eq!(shared.stop(), Some(first));
        let second = shared.begin_start().expect("restart");
        assert!(!shared.finish_start(first));
        assert!(!shared.fail_start(first));
        assert!(shared.finish_start(second));
        assert_eq!(shared.running_generation(), Some(second));
    }

    #[test]
    fn stop_generation_ignores_stale_generations() {
        let shared = Shared::new();
        let first = shared.begin_start().expect("start");
        shared.stop();
        let second = shared.begin_start().expect("restart");
        assert!(!shared.stop_generation(first));
        assert!(shared.is_current(second));
        assert!(shared.stop_generation(second));
        assert_eq!(shared.state(), RuntimeState::Stopped);
    }

    #[test]
    fn watch_channel_mirrors_transitions() {
        let shared = Shared::new();
        let rx = shared.subscribe();
        let generation = shared.begin_start().expect("start");
        assert_eq!(*rx.borrow(), RuntimeState::Starting);
        shared.fail_start(generation);
        assert_eq!(*rx.borrow(), RuntimeState::Stopped);
    }
}
