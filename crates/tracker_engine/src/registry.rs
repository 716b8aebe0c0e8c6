use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracker_core::{ConnectionStatus, ProgressModel, ReconnectPolicy, TaskId};
use tracker_logging::{tracker_debug, tracker_warn};

use crate::{
    CallbackSink, ChannelSink, ConnectionManager, ProgressSink, ProgressSubscription,
    TrackerError, TrackerEvent, TrackerSettings, Transport, WsTransport,
};

struct Entry {
    manager: Arc<ConnectionManager>,
    refs: usize,
}

struct RegistryInner {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    entries: Mutex<HashMap<TaskId, Entry>>,
}

/// Reference-counted directory of shared connections, one per task id.
///
/// Cloning is cheap and every clone refers to the same directory.
#[derive(Clone)]
pub struct TaskConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl TaskConnectionRegistry {
    pub fn new(transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transport,
                policy,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registry backed by the WebSocket transport described by `settings`.
    pub fn from_settings(settings: &TrackerSettings) -> Result<Self, TrackerError> {
        let transport = WsTransport::new(&settings.base_url)?;
        Ok(Self::new(Arc::new(transport), settings.reconnect.clone()))
    }

    /// Take a reference on the task's connection, opening it on first use.
    pub fn acquire(&self, task_id: &str) -> Arc<ConnectionManager> {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(task_id) {
            entry.refs += 1;
            tracker_debug!("task {}: reusing connection (refs={})", task_id, entry.refs);
            return Arc::clone(&entry.manager);
        }

        let manager = ConnectionManager::open(
            task_id,
            Arc::clone(&self.inner.transport),
            self.inner.policy.clone(),
        );
        entries.insert(
            task_id.to_string(),
            Entry {
                manager: Arc::clone(&manager),
                refs: 1,
            },
        );
        manager
    }

    /// Drop a reference; the last release closes the connection.
    /// Returns true when the connection was closed.
    pub fn release(&self, task_id: &str) -> bool {
        self.release_matching(task_id, None)
    }

    /// Release only if `manager` is still the registered connection, so a
    /// handle that outlived [`shutdown`](Self::shutdown) cannot release a
    /// newer connection for the same task.
    pub(crate) fn release_manager(&self, manager: &Arc<ConnectionManager>) -> bool {
        self.release_matching(manager.task_id(), Some(manager))
    }

    fn release_matching(&self, task_id: &str, expected: Option<&Arc<ConnectionManager>>) -> bool {
        let removed = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(task_id) else {
                tracker_warn!("task {}: release without matching acquire", task_id);
                return false;
            };
            if let Some(expected) = expected {
                if !Arc::ptr_eq(&entry.manager, expected) {
                    tracker_debug!("task {}: ignoring release for a replaced connection", task_id);
                    return false;
                }
            }

            entry.refs -= 1;
            if entry.refs > 0 {
                tracker_debug!("task {}: released (refs={})", task_id, entry.refs);
                return false;
            }
            entries.remove(task_id)
        };

        // Closing takes the manager's own lock; the registry lock is free by now.
        if let Some(entry) = removed {
            entry.manager.close();
        }
        true
    }

    pub fn ref_count(&self, task_id: &str) -> usize {
        self.lock().get(task_id).map_or(0, |entry| entry.refs)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn subscribe(&self, task_id: &str, sink: Arc<dyn ProgressSink>) -> ProgressSubscription {
        ProgressSubscription::subscribe(self, task_id, sink)
    }

    pub fn subscribe_with<S, C>(
        &self,
        task_id: &str,
        on_snapshot: S,
        on_connection: C,
    ) -> ProgressSubscription
    where
        S: Fn(&Arc<ProgressModel>) + Send + Sync + 'static,
        C: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let sink = CallbackSink::new(on_snapshot, on_connection);
        ProgressSubscription::subscribe(self, task_id, Arc::new(sink))
    }

    /// Subscribe with events delivered to a channel.
    pub fn subscribe_channel(
        &self,
        task_id: &str,
    ) -> (ProgressSubscription, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink::new(tx));
        (ProgressSubscription::subscribe(self, task_id, sink), rx)
    }

    /// Close every connection regardless of outstanding references and wait
    /// for the graceful closes to finish.
    pub async fn shutdown(&self) {
        let managers: Vec<_> = self
            .lock()
            .drain()
            .map(|(_, entry)| entry.manager)
            .collect();
        for manager in &managers {
            manager.close();
        }
        for manager in managers {
            manager.closed().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
