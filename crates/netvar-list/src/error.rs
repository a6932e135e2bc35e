use netvar_frame::{FrameError, VariableKind};

/// Errors that can occur in list operations.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] netvar_transport::TransportError),

    /// Frame-level error while encoding an outbound frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The same variable name was declared twice.
    #[error("variable {0:?} declared more than once")]
    DuplicateVariable(String),

    /// A declaration file could not be understood.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// A value does not match the declared kind of its variable.
    #[error("variable {name:?} is {expected}, got a {found} value")]
    KindMismatch {
        name: String,
        expected: VariableKind,
        found: VariableKind,
    },

    /// An inbound frame could not be fully decoded.
    #[error("list {list_id} frame for var {var_id}: field {field:?}: {source}")]
    Decode {
        list_id: u16,
        var_id: u16,
        field: String,
        source: FrameError,
    },

    /// The list has been disposed.
    #[error("list disposed")]
    Disposed,

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ListError>;
