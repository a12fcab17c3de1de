use crate::packet::MessageType;

/// All error types that can occur when talking to LIFX devices.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A public call received a value of the wrong shape (e.g. an IPv6
    /// address where IPv4 is required, or a configuration field of the
    /// wrong JSON type).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value was outside its permitted bounds, or named an unknown packet type.
    #[error("out of range: {0}")]
    Range(String),

    /// A one-shot handler or queued packet exhausted its wait or retry budget.
    #[error("no {kind} response in time for sequence {sequence}")]
    Timeout { kind: MessageType, sequence: u8 },

    /// A received datagram could not be decoded.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// Failed to load configuration from JSON.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// The client has been destroyed.
    #[error("client is closed")]
    ClientClosed,
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn range(msg: impl Into<String>) -> Self {
        Error::Range(msg.into())
    }

    /// Whether this error reports an exhausted wait or retry budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
