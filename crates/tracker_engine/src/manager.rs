//! One shared connection to one task's progress stream.
//!
//! The manager caches the last accepted snapshot and the connection status,
//! and fans both out to every registered sink. A single spawned driver task
//! owns the transport connection and performs every state transition, so
//! sinks observe snapshots strictly in sequence order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracker_core::{
    check_snapshot, parse_message, CloseKind, CloseReason, ConnectionState, ConnectionStatus,
    OutboundMessage, ProgressModel, ReconnectDecision, ReconnectPolicy, ReconnectState, Rejection,
    TaskId,
};
use tracker_logging::{tracker_debug, tracker_info, tracker_trace, tracker_warn};

use crate::{Connection, TrackerError, Transport, TransportEvent};

/// Receives snapshots and connection changes for one task.
///
/// Called outside the manager's state lock, so a sink may query the manager,
/// unsubscribe or release its task from inside a callback. Deliveries for
/// one manager are serialized; a sink must not subscribe to the same task
/// from inside its own callback.
pub trait ProgressSink: Send + Sync {
    fn on_snapshot(&self, snapshot: &Arc<ProgressModel>);
    fn on_connection(&self, task_id: &str, status: ConnectionStatus);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Snapshot(Arc<ProgressModel>),
    Connection {
        task_id: TaskId,
        status: ConnectionStatus,
    },
}

/// Forwards everything to an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TrackerEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<TrackerEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn on_snapshot(&self, snapshot: &Arc<ProgressModel>) {
        let _ = self.tx.send(TrackerEvent::Snapshot(Arc::clone(snapshot)));
    }

    fn on_connection(&self, task_id: &str, status: ConnectionStatus) {
        let _ = self.tx.send(TrackerEvent::Connection {
            task_id: task_id.to_string(),
            status,
        });
    }
}

/// Adapts a pair of closures into a sink.
pub struct CallbackSink<S, C> {
    on_snapshot: S,
    on_connection: C,
}

impl<S, C> CallbackSink<S, C>
where
    S: Fn(&Arc<ProgressModel>) + Send + Sync,
    C: Fn(ConnectionStatus) + Send + Sync,
{
    pub fn new(on_snapshot: S, on_connection: C) -> Self {
        Self {
            on_snapshot,
            on_connection,
        }
    }
}

impl<S, C> ProgressSink for CallbackSink<S, C>
where
    S: Fn(&Arc<ProgressModel>) + Send + Sync,
    C: Fn(ConnectionStatus) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &Arc<ProgressModel>) {
        (self.on_snapshot)(snapshot);
    }

    fn on_connection(&self, _task_id: &str, status: ConnectionStatus) {
        (self.on_connection)(status);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

enum Command {
    Send(String),
}

struct Shared {
    model: Arc<ProgressModel>,
    status: ConnectionStatus,
    reconnect: ReconnectState,
    sinks: Vec<(SinkId, Arc<dyn ProgressSink>)>,
    next_sink_id: u64,
}

struct Inner {
    task_id: TaskId,
    shared: Mutex<Shared>,
    /// Held across each fan-out so sinks see events in the order they
    /// happened. Never taken while `shared` is held.
    delivery: Mutex<()>,
}

pub struct ConnectionManager {
    inner: Arc<Inner>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Start connecting to `task_id`. Must be called inside a tokio runtime.
    pub fn open(
        task_id: impl Into<TaskId>,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        let task_id = task_id.into();
        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                model: Arc::new(ProgressModel::empty(task_id.clone())),
                status: ConnectionStatus::connecting(0),
                reconnect: ReconnectState::new(policy),
                sinks: Vec::new(),
                next_sink_id: 0,
            }),
            delivery: Mutex::new(()),
            task_id,
        });
        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tracker_info!("opening progress connection for task {}", inner.task_id);
        let driver = tokio::spawn(drive(
            Arc::clone(&inner),
            transport,
            command_rx,
            cancel.clone(),
        ));

        Arc::new(Self {
            inner,
            commands,
            cancel,
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    /// Last accepted snapshot, or the empty model before the first one.
    pub fn snapshot(&self) -> Arc<ProgressModel> {
        Arc::clone(&self.inner.lock().model)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn is_closed(&self) -> bool {
        self.connection_status().is_terminal()
    }

    /// Register a sink and hand it the cached state right away.
    pub fn add_sink(&self, sink: Arc<dyn ProgressSink>) -> SinkId {
        let _delivery = self.inner.lock_delivery();
        let (id, model, status) = {
            let mut shared = self.inner.lock();
            let id = SinkId(shared.next_sink_id);
            shared.next_sink_id += 1;
            shared.sinks.push((id, Arc::clone(&sink)));
            (id, Arc::clone(&shared.model), shared.status)
        };

        if !model.is_empty() {
            sink.on_snapshot(&model);
        }
        sink.on_connection(&self.inner.task_id, status);
        id
    }

    pub fn remove_sink(&self, id: SinkId) -> bool {
        let mut shared = self.inner.lock();
        let before = shared.sinks.len();
        shared.sinks.retain(|(sink_id, _)| *sink_id != id);
        shared.sinks.len() != before
    }

    /// Queue a text frame for the producer. Only valid while open; frames
    /// still queued when that connection drops are discarded, never replayed
    /// on the next one.
    pub fn send(&self, payload: impl Into<String>) -> Result<(), TrackerError> {
        let status = self.connection_status();
        if status.state != ConnectionState::Open {
            return Err(TrackerError::NotOpen {
                task_id: self.inner.task_id.clone(),
                state: status.state,
            });
        }
        self.commands
            .send(Command::Send(payload.into()))
            .map_err(|_| TrackerError::ShutDown(self.inner.task_id.clone()))
    }

    /// Close for good. Cancels any pending reconnection; idempotent.
    pub fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.inner.lock().reconnect.cancel();
        self.cancel.cancel();
        tracker_info!("closing progress connection for task {}", self.inner.task_id);
    }

    /// Wait until the driver has finished, including a graceful close.
    pub async fn closed(&self) {
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attempts(&self) -> u32 {
        self.lock().reconnect.attempts()
    }

    fn set_status(&self, status: ConnectionStatus) {
        let _delivery = self.lock_delivery();
        let sinks = {
            let mut shared = self.lock();
            if shared.status == status {
                return;
            }
            tracker_debug!(
                "task {}: connection {} -> {}",
                self.task_id,
                shared.status.state,
                status.state
            );
            shared.status = status;
            shared.sink_list()
        };
        for sink in sinks {
            sink.on_connection(&self.task_id, status);
        }
    }

    fn handle_text(&self, raw: &str) {
        let incoming = match parse_message(raw) {
            Ok(model) => model,
            Err(err) => {
                tracker_warn!("task {}: dropping malformed message: {}", self.task_id, err);
                return;
            }
        };

        let _delivery = self.lock_delivery();
        let mut shared = self.lock();
        match check_snapshot(&shared.model, &incoming) {
            Ok(()) => shared.reconnect.on_message(),
            Err(rejection @ Rejection::Stale { .. }) => {
                shared.reconnect.on_message();
                tracker_debug!("task {}: discarding {}", self.task_id, rejection);
                return;
            }
            Err(rejection) => {
                tracker_warn!("task {}: dropping message: {}", self.task_id, rejection);
                return;
            }
        }
        for issue in incoming.quality_issues() {
            tracker_debug!(
                "task {} sequence {}: {}",
                self.task_id,
                incoming.sequence,
                issue
            );
        }

        tracker_trace!(
            "task {}: accepted sequence {} at {}%",
            self.task_id,
            incoming.sequence,
            incoming.overall_progress
        );
        let snapshot = Arc::new(incoming);
        shared.model = Arc::clone(&snapshot);
        let sinks = shared.sink_list();
        drop(shared);
        for sink in sinks {
            sink.on_snapshot(&snapshot);
        }
    }
}

impl Shared {
    fn sink_list(&self) -> Vec<Arc<dyn ProgressSink>> {
        self.sinks.iter().map(|(_, sink)| Arc::clone(sink)).collect()
    }
}

async fn drive(
    inner: Arc<Inner>,
    transport: Arc<dyn Transport>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    let reason = loop {
        inner.set_status(ConnectionStatus::connecting(inner.attempts()));

        let kind = tokio::select! {
            biased;
            _ = cancel.cancelled() => CloseKind::Requested,
            connected = transport.connect(&inner.task_id) => match connected {
                Ok(connection) => {
                    run_connection(&inner, connection, &mut commands, &cancel).await
                }
                Err(err) => {
                    tracker_warn!("task {}: connect failed: {}", inner.task_id, err);
                    CloseKind::Abnormal
                }
            },
        };

        let decision = inner.lock().reconnect.on_closed(kind);
        match decision {
            ReconnectDecision::Retry {
                attempt: next,
                delay,
                generation,
            } => {
                tracker_info!(
                    "task {}: reconnecting in {:?} (attempt {})",
                    inner.task_id,
                    delay,
                    next
                );
                inner.set_status(ConnectionStatus::reconnecting(next));
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                if !inner.lock().reconnect.is_current(generation) {
                    tracker_debug!(
                        "task {}: reconnection {} superseded",
                        inner.task_id,
                        generation
                    );
                    break CloseReason::Requested;
                }
            }
            ReconnectDecision::Stop(reason) => {
                if reason == CloseReason::AttemptsExhausted {
                    tracker_warn!(
                        "task {}: giving up after {} reconnection attempts",
                        inner.task_id,
                        inner.attempts()
                    );
                }
                break reason;
            }
        }
    };

    inner.set_status(ConnectionStatus::terminated(inner.attempts(), reason));
    tracker_info!("task {}: connection closed ({})", inner.task_id, reason);
}

async fn run_connection(
    inner: &Inner,
    mut connection: Box<dyn Connection>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    cancel: &CancellationToken,
) -> CloseKind {
    let stale = discard_queued(commands);
    if stale > 0 {
        tracker_debug!(
            "task {}: discarded {} frames queued for the previous connection",
            inner.task_id,
            stale
        );
    }
    inner.set_status(ConnectionStatus::open());

    match OutboundMessage::request_status(inner.task_id.clone()).to_json() {
        Ok(request) => {
            if let Err(err) = connection.send(request).await {
                tracker_warn!("task {}: status request failed: {}", inner.task_id, err);
                return CloseKind::Abnormal;
            }
        }
        Err(err) => tracker_warn!("task {}: cannot encode status request: {}", inner.task_id, err),
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                inner.set_status(ConnectionStatus::closing(inner.attempts()));
                if let Err(err) = connection.close().await {
                    tracker_debug!("task {}: close failed: {}", inner.task_id, err);
                }
                return CloseKind::Requested;
            }
            Some(Command::Send(payload)) = commands.recv() => {
                if let Err(err) = connection.send(payload).await {
                    tracker_warn!("task {}: send failed: {}", inner.task_id, err);
                    return CloseKind::Abnormal;
                }
            }
            event = connection.recv() => match event {
                TransportEvent::Text(raw) => inner.handle_text(&raw),
                TransportEvent::Closed(kind) => return kind,
            },
        }
    }
}

fn discard_queued(commands: &mut mpsc::UnboundedReceiver<Command>) -> usize {
    let mut discarded = 0;
    while commands.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}
