use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use tokio::sync::mpsc;
use tracker_core::{ConnectionStatus, ProgressModel, ProgressViewModel};
use tracker_engine::{
    ChannelSink, LocalEventBus, ProgressSubscription, SimulatedTransport, TaskConnectionRegistry,
    TaskStarted, TrackerEvent,
};
use tracker_logging::{tracker_info, tracker_warn};

use super::config::{apply_overrides, load_settings};
use super::logging::{self, LogDestination};
use super::render::render;
use crate::Args;

pub async fn run(args: Args) -> anyhow::Result<()> {
    let destination = if args.log_file {
        LogDestination::Both(PathBuf::from(logging::LOG_FILE))
    } else {
        LogDestination::Terminal
    };
    logging::initialize(destination, logging::level_for(args.verbose));

    let settings = load_settings(args.config.as_deref())?;
    let settings = apply_overrides(settings, args.url.as_deref())?;

    let registry = if args.simulate {
        tracker_info!("Simulating task {}", args.task_id);
        TaskConnectionRegistry::new(
            Arc::new(SimulatedTransport::default()),
            settings.reconnect.clone(),
        )
    } else {
        tracker_info!("Tracking task {} via {}", args.task_id, settings.base_url);
        TaskConnectionRegistry::from_settings(&settings)?
    };

    // The display subscribes when a task start is announced.
    let bus = LocalEventBus::new();
    let subscriptions: Arc<Mutex<Vec<ProgressSubscription>>> = Arc::default();
    let (tx, mut events) = mpsc::unbounded_channel();
    let _listener = bus.on_task_started({
        let registry = registry.clone();
        let subscriptions = Arc::clone(&subscriptions);
        move |event: &TaskStarted| {
            let sink = Arc::new(ChannelSink::new(tx.clone()));
            let subscription = registry.subscribe(&event.task_id, sink);
            subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(subscription);
        }
    });
    let source = if args.simulate { "simulation" } else { "cli" };
    bus.publish_task_started(args.task_id.as_str(), json!({ "source": source }));

    let mut display = Display::new(&args.task_id);
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if display.apply(event) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracker_info!("Interrupted, closing connections");
                break;
            }
        }
    }

    subscriptions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
    registry.shutdown().await;

    if let Some(error) = &display.model.error {
        tracker_warn!("Task {} failed: {}", args.task_id, error);
    }
    Ok(())
}

/// Latest state as seen by the terminal, redrawn when it changes.
struct Display {
    model: Arc<ProgressModel>,
    connection: ConnectionStatus,
    last_frame: Vec<String>,
}

impl Display {
    fn new(task_id: &str) -> Self {
        Self {
            model: Arc::new(ProgressModel::empty(task_id)),
            connection: ConnectionStatus::default(),
            last_frame: Vec::new(),
        }
    }

    /// Returns true once no further updates can arrive.
    fn apply(&mut self, event: TrackerEvent) -> bool {
        match event {
            TrackerEvent::Snapshot(snapshot) => self.model = snapshot,
            TrackerEvent::Connection { status, .. } => self.connection = status,
        }
        let view = ProgressViewModel::build(&self.model, &self.connection);
        let frame = render(&view);
        if frame != self.last_frame {
            println!("{}", frame.join("\n"));
            self.last_frame = frame;
        }
        view.status.is_final()
    }
}
