//! Tracker engine: shared progress connections and their consumers.
mod bus;
mod error;
mod manager;
mod registry;
mod settings;
mod simulate;
mod subscription;
mod transport;
mod websocket;

pub use bus::{BusSubscription, LocalEventBus, TaskStarted};
pub use error::{TrackerError, TransportError};
pub use manager::{
    CallbackSink, ChannelSink, ConnectionManager, ProgressSink, SinkId, TrackerEvent,
};
pub use registry::TaskConnectionRegistry;
pub use settings::{TrackerSettings, DEFAULT_BASE_URL};
pub use simulate::{SimulatedStep, SimulatedTransport, SimulationScript};
pub use subscription::ProgressSubscription;
pub use transport::{Connection, Transport, TransportEvent};
pub use websocket::WsTransport;
