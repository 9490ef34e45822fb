use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::error;

pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// One `on_message` and one `on_error` subscriber. Setting a slot replaces
/// whatever was there (last writer wins).
#[derive(Default)]
pub struct CallbackSlots {
    on_message: Mutex<Option<MessageCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl CallbackSlots {
    pub fn set_on_message(&self, callback: MessageCallback) {
        *self.on_message.lock() = Some(callback);
    }

    pub fn set_on_error(&self, callback: ErrorCallback) {
        *self.on_error.lock() = Some(callback);
    }

    pub fn clear(&self) {
        self.on_message.lock().take();
        self.on_error.lock().take();
    }

    #[must_use]
    pub fn has_on_message(&self) -> bool {
        self.on_message.lock().is_some()
    }

    #[must_use]
    pub fn has_on_error(&self) -> bool {
        self.on_error.lock().is_some()
    }

    /// Invoke `on_message`. Returns false when the slot is empty.
    pub fn emit_message(&self, message: &str) -> bool {
        // Clone out so a callback can replace the slot it is running from.
        let callback = self.on_message.lock().clone();
        callback.is_some_and(|callback| {
            contain_panic("on_message", || callback(message));
            true
        })
    }

    /// Invoke `on_error`. Returns false when the slot is empty.
    pub fn emit_error(&self, message: &str) -> bool {
        let callback = self.on_error.lock().clone();
        callback.is_some_and(|callback| {
            contain_panic("on_error", || callback(message));
            true
        })
    }
}

/// Run host-supplied code on the background thread. A panic is logged and
/// yields `None`; the thread keeps serving commands.
pub(crate) fn contain_panic<R>(callback: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!(callback, panic = panic_message(&*payload), "Host callback panicked");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
