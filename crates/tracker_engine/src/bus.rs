//! In-process publish/subscribe keyed by event type.
//!
//! Delivery is synchronous and in subscription order. A handler that panics
//! is logged and skipped; the remaining handlers still run. Handlers may
//! publish or subscribe from inside a delivery.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracker_core::TaskId;
use tracker_logging::{tracker_debug, tracker_error};

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Announcement that a background task has started.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStarted {
    pub task_id: TaskId,
    pub metadata: Value,
}

#[derive(Default)]
struct BusInner {
    handlers: Mutex<HashMap<TypeId, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<TypeId, Vec<(u64, Handler)>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, type_id: TypeId, id: u64) {
        let mut handlers = self.lock();
        if let Some(list) = handlers.get_mut(&type_id) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(&type_id);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct LocalEventBus {
    inner: Arc<BusInner>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<E, F>(&self, handler: F) -> BusSubscription
    where
        E: Any,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let type_id = TypeId::of::<E>();
        let erased: Handler = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });
        self.inner
            .lock()
            .entry(type_id)
            .or_default()
            .push((id, erased));

        BusSubscription {
            bus: Arc::downgrade(&self.inner),
            type_id,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `event` to every handler registered for its type.
    /// Returns how many handlers completed without panicking.
    pub fn publish<E: Any>(&self, event: &E) -> usize {
        // Snapshot the list so handlers can re-enter the bus.
        let handlers: Vec<Handler> = self
            .inner
            .lock()
            .get(&TypeId::of::<E>())
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracker_error!(
                    "event handler panicked while handling {}",
                    std::any::type_name::<E>()
                ),
            }
        }
        delivered
    }

    pub fn handler_count<E: Any>(&self) -> usize {
        self.inner
            .lock()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    pub fn publish_task_started(&self, task_id: impl Into<TaskId>, metadata: Value) -> usize {
        let event = TaskStarted {
            task_id: task_id.into(),
            metadata,
        };
        tracker_debug!("task {}: announcing start", event.task_id);
        self.publish(&event)
    }

    pub fn on_task_started<F>(&self, handler: F) -> BusSubscription
    where
        F: Fn(&TaskStarted) + Send + Sync + 'static,
    {
        self.subscribe::<TaskStarted, F>(handler)
    }
}

/// Registration handle; dropping it unsubscribes.
pub struct BusSubscription {
    bus: Weak<BusInner>,
    type_id: TypeId,
    id: u64,
    active: AtomicBool,
}

impl BusSubscription {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.type_id, self.id);
        }
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
