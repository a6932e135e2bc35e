//! Wire codec for network variable frames.
//!
//! Every datagram carries a fixed 20-byte header followed by a payload of one
//! or more typed scalar values:
//! - A 4-byte identity marker (`00 2D 53 33`)
//! - List id, variable id, item count, total length and sequence counter,
//!   all 2-byte little-endian
//! - Values encoded per kind, little-endian, strings null-terminated
//!
//! A variable id of 0 marks a packed frame carrying the whole list in
//! ascending idx order.

pub mod codec;
pub mod error;
pub mod hex;
pub mod inspect;
pub mod kind;
pub mod value;

pub use codec::{
    decode_header, encode_packed, encode_single, FrameHeader, HEADER_SIZE, IDENTITY,
    MAX_FRAME_SIZE, PACKED_VAR_ID,
};
pub use error::{FrameError, Result};
pub use inspect::{inspect_frame, FieldLayout, FrameReport, IntegrityProblem};
pub use kind::{UnknownKind, VariableKind};
pub use value::{decode_value, encode_value, ParseValueError, Value, VariableSlot};
