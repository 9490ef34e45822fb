#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use background_thread::{
    BackgroundManager, BoxError, Bridge, EntryPoint, ManagerConfig, Payload, Runtime,
    RuntimeFactory,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

pub const WAIT: Duration = Duration::from_secs(5);

struct MockState {
    entries: Mutex<Vec<String>>,
    received: Mutex<Vec<String>>,
    bridges: Mutex<Vec<Bridge>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_create: AtomicBool,
    reject_posts: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
    entered: Notify,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            entries: Mutex::default(),
            received: Mutex::default(),
            bridges: Mutex::default(),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            reject_posts: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }
}

/// Runtime factory that records everything the manager asks of it.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn entries(&self) -> Vec<String> {
        self.state.entries.lock().clone()
    }

    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().clone()
    }

    pub fn bridge(&self, index: usize) -> Bridge {
        self.state.bridges.lock()[index].clone()
    }

    pub fn last_bridge(&self) -> Bridge {
        self.state
            .bridges
            .lock()
            .last()
            .cloned()
            .expect("no runtime was created")
    }

    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.state.max_live.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn reject_posts(&self, reject: bool) {
        self.state.reject_posts.store(reject, Ordering::SeqCst);
    }

    /// Make `create` block until [`MockFactory::release`] is called.
    pub fn hold_construction(&self) {
        self.state.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.state.gate.add_permits(1);
    }

    /// Resolves once `create` has been entered.
    pub async fn wait_entered(&self) {
        tokio::time::timeout(WAIT, self.state.entered.notified())
            .await
            .expect("runtime construction never started");
    }
}

#[async_trait]
impl RuntimeFactory for MockFactory {
    async fn create(
        &self,
        entry: &EntryPoint,
        bridge: Bridge,
    ) -> Result<Box<dyn Runtime>, BoxError> {
        self.state.entered.notify_one();
        if self.state.gated.load(Ordering::SeqCst) {
            self.state.gate.acquire().await?.forget();
        }
        self.state.entries.lock().push(entry.as_str().to_owned());
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(format!("cannot load {entry}").into());
        }

        self.state.bridges.lock().push(bridge);
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(MockRuntime {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockRuntime {
    state: Arc<MockState>,
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn post_message(&mut self, payload: Payload) -> Result<(), BoxError> {
        if self.state.reject_posts.load(Ordering::SeqCst) {
            return Err("runtime is busy".into());
        }
        self.state.received.lock().push(payload.as_str().to_owned());
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects callback invocations.
#[derive(Clone, Default)]
pub struct Recorder {
    items: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn callback(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let items = Arc::clone(&self.items);
        move |text: &str| items.lock().push(text.to_owned())
    }

    pub fn items(&self) -> Vec<String> {
        self.items.lock().clone()
    }
}

pub struct Harness {
    pub manager: BackgroundManager,
    pub factory: MockFactory,
    pub messages: Recorder,
    pub errors: Recorder,
}

pub fn harness() -> Harness {
    let factory = MockFactory::default();
    let manager = BackgroundManager::new(factory.clone(), ManagerConfig::default())
        .expect("failed to create manager");
    let messages = Recorder::default();
    let errors = Recorder::default();
    manager.set_on_message_callback(messages.callback());
    manager.set_on_error_callback(errors.callback());
    Harness {
        manager,
        factory,
        messages,
        errors,
    }
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
