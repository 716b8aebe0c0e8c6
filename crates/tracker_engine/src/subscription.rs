use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracker_core::{ConnectionStatus, ProgressModel};
use tracker_logging::tracker_debug;

use crate::{ConnectionManager, ProgressSink, SinkId, TaskConnectionRegistry};

/// A consumer's interest in one task.
///
/// Holding the subscription keeps the shared connection alive; dropping it
/// (or calling [`unsubscribe`](Self::unsubscribe)) gives the reference back.
pub struct ProgressSubscription {
    registry: TaskConnectionRegistry,
    manager: Arc<ConnectionManager>,
    sink_id: SinkId,
    active: AtomicBool,
}

impl ProgressSubscription {
    /// Acquire the task's connection and register `sink` with it. The sink
    /// receives the cached snapshot (if any) and connection status before
    /// this returns.
    pub fn subscribe(
        registry: &TaskConnectionRegistry,
        task_id: &str,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let manager = registry.acquire(task_id);
        let sink_id = manager.add_sink(sink);
        tracker_debug!("task {}: subscribed {:?}", task_id, sink_id);
        Self {
            registry: registry.clone(),
            manager,
            sink_id,
            active: AtomicBool::new(true),
        }
    }

    pub fn task_id(&self) -> &str {
        self.manager.task_id()
    }

    pub fn snapshot(&self) -> Arc<ProgressModel> {
        self.manager.snapshot()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.connection_status()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop receiving updates. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.manager.remove_sink(self.sink_id);
        self.registry.release_manager(&self.manager);
        tracker_debug!("task {}: unsubscribed {:?}", self.task_id(), self.sink_id);
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
