//! Error types for the RoboDK link.
//!
//! `LinkError` separates transport failures (connect, timeout, protocol
//! desync) from failures reported by the simulator itself (invalid item,
//! error with message, license). Transport failures leave the connection
//! unusable; simulator-reported failures do not.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Errors produced while talking to the simulator.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Failed to open the TCP connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// The server accepted the connection but did not answer the
    /// handshake with a READY line.
    #[error("Handshake rejected: server answered {0:?}")]
    HandshakeRejected(String),

    /// No connection is established (never connected, disconnected, or the
    /// channel was poisoned by an earlier transport failure).
    #[error("Not connected to the simulator")]
    NotConnected,

    /// A receive did not complete within the current timeout. The byte
    /// stream is left in an indeterminate position; reconnect before
    /// issuing further requests.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The byte stream no longer matches the expected wire shape
    /// (oversized array count, stalled matrix read, unexpected status
    /// word). Not locally recoverable; reconnect.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The simulator could not start or never reported readiness.
    #[error("Failed to start the simulator: {0}")]
    StartupFailed(String),

    /// The request referenced an item handle the simulator does not know.
    #[error("Invalid item: the handle does not exist in the station")]
    InvalidItem,

    /// The simulator reported an error for this request.
    #[error("Simulator error: {0}")]
    Remote(String),

    /// The simulator rejected the request because of its license.
    #[error("Invalid simulator license")]
    InvalidLicense,

    /// The simulator reported a problem code it did not explain.
    #[error("Simulator reported unknown problem (status {0})")]
    RemoteUnknown(i32),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl LinkError {
    /// Whether the connection should be considered unusable after this
    /// error. Simulator-reported failures keep the stream aligned; anything
    /// transport-level does not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectionFailed(_)
                | LinkError::HandshakeRejected(_)
                | LinkError::NotConnected
                | LinkError::Timeout(_)
                | LinkError::Protocol(_)
                | LinkError::Io(_)
        )
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                LinkError::ConnectionFailed(err)
            }
            _ => LinkError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let timeout = LinkError::Timeout(Duration::from_secs(1));
        assert_eq!(timeout.to_string(), "Request timed out after 1s");

        let remote = LinkError::Remote("Target is out of reach".to_string());
        assert_eq!(remote.to_string(), "Simulator error: Target is out of reach");
    }

    #[test]
    fn io_error_kind_mapping() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            LinkError::from(refused),
            LinkError::ConnectionFailed(_)
        ));

        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(LinkError::from(broken), LinkError::Io(_)));
    }

    #[test]
    fn fatality_split() {
        assert!(LinkError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(LinkError::Protocol("desync".into()).is_fatal());
        assert!(!LinkError::InvalidItem.is_fatal());
        assert!(!LinkError::Remote("msg".into()).is_fatal());
        assert!(!LinkError::InvalidLicense.is_fatal());
    }
}
