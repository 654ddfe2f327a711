//! Animation Events
//!
//! Named events with JSON payloads are the output boundary towards gameplay
//! code. Producers talk to an [`AnimationEventSystem`]; two implementations
//! are provided:
//!
//! - [`EventQueue`]: a cloneable handle over a shared queue, drained by the
//!   consumer once per frame.
//! - [`AnimationEventBus`]: immediate dispatch to registered listeners,
//!   either for one event name or for every event.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slotmap::{SlotMap, new_key_type};

/// Receiver of animation events.
pub trait AnimationEventSystem: Send {
    fn dispatch_event(&mut self, name: &str, data: &Value);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

// ============================================================================
// Queue
// ============================================================================

/// Shared FIFO of dispatched events. Clones refer to the same queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<Vec<DispatchedEvent>>>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: impl Into<String>, data: Value) {
        self.inner.lock().push(DispatchedEvent {
            name: name.into(),
            data,
        });
    }

    /// Takes every queued event, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<DispatchedEvent> {
        std::mem::take(&mut *self.inner.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl AnimationEventSystem for EventQueue {
    fn dispatch_event(&mut self, name: &str, data: &Value) {
        self.push(name, data.clone());
    }
}

// ============================================================================
// Bus
// ============================================================================

new_key_type! {
    pub struct ListenerHandle;
}

pub type EventListener = Box<dyn FnMut(&str, &Value) + Send>;

struct Listener {
    /// `None` listens to every event.
    event: Option<String>,
    callback: EventListener,
}

/// Registry of event listeners.
#[derive(Default)]
pub struct AnimationEventBus {
    listeners: SlotMap<ListenerHandle, Listener>,
    by_name: FxHashMap<String, Vec<ListenerHandle>>,
    wildcard: Vec<ListenerHandle>,
}

impl std::fmt::Debug for AnimationEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationEventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl AnimationEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `callback` for every event named `event`.
    pub fn subscribe(
        &mut self,
        event: impl Into<String>,
        callback: impl FnMut(&str, &Value) + Send + 'static,
    ) -> ListenerHandle {
        let event = event.into();
        let handle = self.listeners.insert(Listener {
            event: Some(event.clone()),
            callback: Box::new(callback),
        });
        self.by_name.entry(event).or_default().push(handle);
        handle
    }

    /// Calls `callback` for every event.
    pub fn subscribe_all(&mut self, callback: impl FnMut(&str, &Value) + Send + 'static) -> ListenerHandle {
        let handle = self.listeners.insert(Listener {
            event: None,
            callback: Box::new(callback),
        });
        self.wildcard.push(handle);
        handle
    }

    /// Returns `false` if the handle was already removed.
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        let Some(listener) = self.listeners.remove(handle) else {
            return false;
        };
        match listener.event {
            Some(event) => {
                if let Some(handles) = self.by_name.get_mut(&event) {
                    handles.retain(|h| *h != handle);
                    if handles.is_empty() {
                        self.by_name.remove(&event);
                    }
                }
            }
            None => self.wildcard.retain(|h| *h != handle),
        }
        true
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
        self.by_name.clear();
        self.wildcard.clear();
    }

    /// Name-specific listeners run first, in subscription order.
    pub fn publish(&mut self, name: &str, data: &Value) {
        let named = self.by_name.get(name).map(Vec::as_slice).unwrap_or_default();
        for handle in named.iter().chain(self.wildcard.iter()) {
            if let Some(listener) = self.listeners.get_mut(*handle) {
                (listener.callback)(name, data);
            }
        }
    }
}

impl AnimationEventSystem for AnimationEventBus {
    fn dispatch_event(&mut self, name: &str, data: &Value) {
        self.publish(name, data);
    }
}
