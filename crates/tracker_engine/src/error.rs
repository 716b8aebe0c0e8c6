use thiserror::Error;
use tracker_core::ConnectionState;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("connection for task {task_id} is not open ({state})")]
    NotOpen {
        task_id: String,
        state: ConnectionState,
    },
    #[error("connection for task {0} has shut down")]
    ShutDown(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
