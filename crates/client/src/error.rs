//! Error types for the client library.

use thiserror::Error;

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to establish a connection to the server.
    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// Protocol-level error: framing, encoding, or an unexpected disconnect.
    #[error("protocol error: {0}")]
    Protocol(#[source] std::io::Error),

    /// The server rejected the request and returned an `Error` response.
    #[error("server error: {message}")]
    Server { message: String },

    /// The server replied with a shape the request didn't expect (e.g. an
    /// empty ack to a `Get`).
    #[error("unexpected response from server")]
    UnexpectedResponse,
}

impl ClientError {
    /// Returns true if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }

    /// Returns true if this is a protocol error.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, ClientError::Protocol(_))
    }

    /// Returns true if the server returned an `Error` response.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ClientError::Server { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_classifies_correctly() {
        let err = ClientError::Connection(std::io::Error::other("test"));
        assert!(err.is_connection_error());
        assert!(!err.is_protocol_error());
        assert!(!err.is_server_error());
    }

    #[test]
    fn server_error_classifies_correctly() {
        let err = ClientError::Server {
            message: "key doesn't exist".to_string(),
        };
        assert!(!err.is_connection_error());
        assert!(err.is_server_error());
        assert!(err.to_string().contains("key doesn't exist"));
    }

    #[test]
    fn protocol_error_display() {
        let err = ClientError::Protocol(std::io::Error::other("short read"));
        assert!(err.to_string().contains("protocol error"));
    }
}
