#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracker_core::{CloseKind, ConnectionStatus, ProgressModel};
use tracker_engine::{Connection, TrackerEvent, Transport, TransportError, TransportEvent};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tracker_logging::initialize_for_tests);
}

/// Transport whose connections are driven by the test through [`MockPeer`]s.
pub struct MockTransport {
    connects: AtomicUsize,
    refuse: AtomicBool,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            peers,
        });
        (transport, peer_rx)
    }

    /// Every connect attempt fails.
    pub fn refusing() -> Arc<Self> {
        let (transport, _peers) = Self::new();
        transport.refuse.store(true, Ordering::SeqCst);
        transport
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let closed_by_client = Arc::new(AtomicBool::new(false));
        let _ = self.peers.send(MockPeer {
            task_id: task_id.to_string(),
            events: events_tx,
            outbound: outbound_rx,
            closed_by_client: Arc::clone(&closed_by_client),
        });
        Ok(Box::new(MockConnection {
            events,
            outbound,
            closed_by_client,
        }))
    }
}

struct MockConnection {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
    closed_by_client: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> TransportEvent {
        self.events
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed(CloseKind::Abnormal))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed_by_client.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The producer's end of one mock connection.
pub struct MockPeer {
    pub task_id: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    closed_by_client: Arc<AtomicBool>,
}

impl MockPeer {
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into()));
    }

    pub fn push(&self, message: Value) {
        self.push_text(message.to_string());
    }

    pub fn close(&self, kind: CloseKind) {
        let _ = self.events.send(TransportEvent::Closed(kind));
    }

    pub async fn next_outbound(&mut self) -> Option<Value> {
        let text = self.outbound.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Next frame the client already sent, without waiting.
    pub fn try_next_outbound(&mut self) -> Option<Value> {
        let text = self.outbound.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn was_closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

pub fn progress(task_id: &str, sequence: u64, overall: f64) -> Value {
    json!({
        "type": "progress_update",
        "task_id": task_id,
        "sequence": sequence,
        "overall_progress": overall,
        "elapsed_time_ms": sequence * 100,
        "steps": [],
    })
}

pub async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<TrackerEvent>) -> Arc<ProgressModel> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("subscription channel closed");
        if let TrackerEvent::Snapshot(snapshot) = event {
            return snapshot;
        }
    }
}

pub async fn wait_for_status(
    rx: &mut mpsc::UnboundedReceiver<TrackerEvent>,
    done: impl Fn(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timed out waiting for connection status")
            .expect("subscription channel closed");
        if let TrackerEvent::Connection { status, .. } = event {
            if done(&status) {
                return status;
            }
        }
    }
}

/// Collect connection statuses until `done` matches (inclusive).
pub async fn collect_statuses(
    rx: &mut mpsc::UnboundedReceiver<TrackerEvent>,
    done: impl Fn(&ConnectionStatus) -> bool,
) -> Vec<ConnectionStatus> {
    let mut seen = Vec::new();
    loop {
        let status = wait_for_status(rx, |_| true).await;
        seen.push(status);
        if done(&status) {
            return seen;
        }
    }
}
