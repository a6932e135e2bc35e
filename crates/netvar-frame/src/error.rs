use crate::kind::VariableKind;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// The datagram is shorter than the fixed header.
    #[error("runt frame ({len} bytes, header needs 20)")]
    Runt { len: usize },

    /// The frame does not start with the identity marker.
    #[error("invalid frame identity (expected 00 2d 53 33)")]
    InvalidIdentity,

    /// A variable-width field has no terminator before the payload ends.
    #[error("{kind} at offset {offset}: terminator not found")]
    TerminatorNotFound { kind: VariableKind, offset: usize },

    /// A fixed-width field extends past the end of the payload.
    #[error("{kind} at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        kind: VariableKind,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A string value cannot be represented in its wire encoding.
    #[error("{kind} value contains characters that cannot be encoded")]
    UnencodableString { kind: VariableKind },

    /// The encoded frame would not fit the 16-bit length field.
    #[error("frame too large ({size} bytes, max 65535)")]
    FrameTooLarge { size: usize },

    /// A packed frame would carry more items than the 16-bit count allows.
    #[error("too many items for one frame ({count}, max 65535)")]
    TooManyItems { count: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
