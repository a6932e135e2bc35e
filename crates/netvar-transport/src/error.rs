use std::net::SocketAddr;

/// Errors that can occur in UDP transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the local socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The destination endpoint could not be resolved to a socket address.
    #[error("failed to resolve endpoint {endpoint}")]
    Resolve { endpoint: String },

    /// A datagram could not be handed to the network stack.
    #[error("failed to send to {dest}: {source}")]
    Send {
        dest: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
