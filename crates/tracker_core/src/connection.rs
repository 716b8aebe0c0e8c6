use std::fmt;

/// Transport lifecycle of one shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a connection ended for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// `close()` was called, usually because the last subscriber left.
    Requested,
    /// The producer closed the stream with a normal close frame.
    RemoteClosed,
    /// Unclean closures exceeded the reconnection budget.
    AttemptsExhausted,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => write!(f, "closed by client"),
            CloseReason::RemoteClosed => write!(f, "closed by server"),
            CloseReason::AttemptsExhausted => write!(f, "reconnection attempts exhausted"),
        }
    }
}

/// Connection status as observed by every subscriber of a task.
///
/// `Closed` without a close reason means a reconnection is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnection attempt in progress or scheduled; 0 on the first connection.
    pub attempt: u32,
    pub close_reason: Option<CloseReason>,
}

impl ConnectionStatus {
    pub fn connecting(attempt: u32) -> Self {
        Self {
            state: ConnectionState::Connecting,
            attempt,
            close_reason: None,
        }
    }

    pub fn open() -> Self {
        Self {
            state: ConnectionState::Open,
            attempt: 0,
            close_reason: None,
        }
    }

    pub fn closing(attempt: u32) -> Self {
        Self {
            state: ConnectionState::Closing,
            attempt,
            close_reason: None,
        }
    }

    /// Closed with a retry pending.
    pub fn reconnecting(attempt: u32) -> Self {
        Self {
            state: ConnectionState::Closed,
            attempt,
            close_reason: None,
        }
    }

    pub fn terminated(attempt: u32, reason: CloseReason) -> Self {
        Self {
            state: ConnectionState::Closed,
            attempt,
            close_reason: Some(reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.close_reason.is_some()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.close_reason.is_none() && self.attempt > 0 && self.state != ConnectionState::Open
    }
}
