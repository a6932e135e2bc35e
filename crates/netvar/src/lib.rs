//! Network variable lists for PLC controllers over UDP.
//!
//! netvar exchanges named, typed scalar variables with an industrial
//! controller using its network variable list protocol: a fixed 20-byte
//! header followed by one value (single frame) or the whole list (packed
//! frame).
//!
//! # Crate Structure
//!
//! - [`transport`] — UDP socket and the `DatagramSink` seam
//! - [`frame`] — value model, frame codec and integrity inspector
//! - [`list`] — list engine, dispatch registry and client (behind `list` feature)

/// Re-export transport types.
pub mod transport {
    pub use netvar_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use netvar_frame::*;
}

/// Re-export list types (requires `list` feature).
#[cfg(feature = "list")]
pub mod list {
    pub use netvar_list::*;
}
