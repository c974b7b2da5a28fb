use thiserror::Error;

/// Every way a single connect / execute attempt can fail.
#[derive(Error, Debug)]
pub enum RconError {
    #[error("Connection timed out. Check your host and port.")]
    ConnectionTimeout,
    #[error("Authentication failed. Check your password.")]
    AuthenticationFailed,
    #[error("Connection failed with status code: {0}")]
    ConnectionRefused(u16),
    #[error("Failed to connect: {0}")]
    ConnectionError(String),
    #[error("Not connected to server")]
    NotConnected,
    #[error("Server did not respond in time.")]
    ServerTimeout,
    #[error("Received invalid JSON response from server: {0}")]
    MalformedResponse(String),
    #[error("Error sending command: {0}")]
    TransportError(String),
    #[error("Operation interrupted by user.")]
    Interrupted,
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid connection options: {0}")]
    InvalidOptions(String),
    #[error("{0}")]
    Internal(String),
    #[error("Giving up after {attempts} failed attempt(s)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<RconError>,
    },
}

impl RconError {
    /// Whether another connect / execute attempt may succeed where this one failed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RconError::ConnectionTimeout
                | RconError::AuthenticationFailed
                | RconError::ConnectionRefused(_)
                | RconError::ConnectionError(_)
                | RconError::NotConnected
                | RconError::ServerTimeout
                | RconError::MalformedResponse(_)
                | RconError::TransportError(_)
        )
    }

    /// Maps a rejected WebSocket upgrade to its domain error.
    pub fn from_handshake_status(status: u16) -> Self {
        if status == 401 {
            RconError::AuthenticationFailed
        } else {
            RconError::ConnectionRefused(status)
        }
    }
}
