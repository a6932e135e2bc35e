//! Frame header and whole-frame encoding.
//!
//! Every frame is a 20-byte little-endian header followed by the
//! concatenated values it carries.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::value::VariableSlot;

/// Fixed frame header size.
pub const HEADER_SIZE: usize = 20;

/// Identity marker: `00 2D 53 33` ("\0-S3").
pub const IDENTITY: [u8; 4] = [0x00, 0x2D, 0x53, 0x33];

/// Variable id addressing the whole list (packed frame).
pub const PACKED_VAR_ID: u16 = 0;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    /// Reserved 4-byte field after the identity; zero on frames we send.
    pub reserved: u32,
    /// List identifier.
    pub list_id: u16,
    /// Variable idx, or [`PACKED_VAR_ID`] for packed frames.
    pub var_id: u16,
    /// Number of values in the payload.
    pub item_count: u16,
    /// Header plus payload length as claimed by the sender.
    pub total_length: u16,
    /// Sender's sequence counter. Informational only.
    pub counter: u16,
    pub flags: u8,
    pub checksum: u8,
}

impl FrameHeader {
    /// True if this frame carries the whole list.
    pub fn is_packed(&self) -> bool {
        self.var_id == PACKED_VAR_ID
    }

    /// The payload bytes following the header in `datagram`.
    pub fn payload<'a>(&self, datagram: &'a [u8]) -> &'a [u8] {
        datagram.get(HEADER_SIZE..).unwrap_or_default()
    }

    fn write_into(&self, dst: &mut [u8]) {
        dst[0..4].copy_from_slice(&IDENTITY);
        dst[4..8].copy_from_slice(&self.reserved.to_le_bytes());
        dst[8..10].copy_from_slice(&self.list_id.to_le_bytes());
        dst[10..12].copy_from_slice(&self.var_id.to_le_bytes());
        dst[12..14].copy_from_slice(&self.item_count.to_le_bytes());
        dst[14..16].copy_from_slice(&self.total_length.to_le_bytes());
        dst[16..18].copy_from_slice(&self.counter.to_le_bytes());
        dst[18] = self.flags;
        dst[19] = self.checksum;
    }
}

/// Encode a single-variable frame.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬────────┬────────┬───────┬────────┬─────────┬───────┬──────────┬─────────┐
/// │ Identity │ Reserved │ ListId │ VarId  │ Items │ Length │ Counter │ Flags │ Checksum │ Payload │
/// │ 002d5333 │ (4B)     │ (2B LE)│ (2B LE)│ (2B)  │ (2B LE)│ (2B LE) │ (1B)  │ (1B)     │         │
/// └──────────┴──────────┴────────┴────────┴───────┴────────┴─────────┴───────┴──────────┴─────────┘
/// ```
/// `VarId` is the slot's idx, `Items` is 1 and `Length` covers header and payload.
pub fn encode_single(
    list_id: u16,
    slot: &VariableSlot,
    counter: u16,
    dst: &mut BytesMut,
) -> Result<()> {
    encode_frame(list_id, slot.idx(), counter, std::iter::once(slot), dst)
}

/// Encode a packed frame carrying every slot, in the order given.
///
/// Callers pass slots in ascending idx order; the payload is their
/// concatenation and `VarId` is [`PACKED_VAR_ID`].
pub fn encode_packed<'a, I>(list_id: u16, counter: u16, slots: I, dst: &mut BytesMut) -> Result<()>
where
    I: IntoIterator<Item = &'a VariableSlot>,
{
    encode_frame(list_id, PACKED_VAR_ID, counter, slots, dst)
}

fn encode_frame<'a, I>(
    list_id: u16,
    var_id: u16,
    counter: u16,
    slots: I,
    dst: &mut BytesMut,
) -> Result<()>
where
    I: IntoIterator<Item = &'a VariableSlot>,
{
    let start = dst.len();
    dst.put_bytes(0, HEADER_SIZE);

    let mut items = 0usize;
    for slot in slots {
        if let Err(err) = slot.encode(dst) {
            trace!(list_id, var_id, idx = slot.idx(), error = %err, "value not encodable");
            dst.truncate(start);
            return Err(err);
        }
        items += 1;
    }

    let size = dst.len() - start;
    if size > MAX_FRAME_SIZE {
        trace!(list_id, var_id, size, "frame exceeds the 16-bit length field");
        dst.truncate(start);
        return Err(FrameError::FrameTooLarge { size });
    }
    let item_count = u16::try_from(items).map_err(|_| {
        dst.truncate(start);
        FrameError::TooManyItems { count: items }
    })?;

    let header = FrameHeader {
        reserved: 0,
        list_id,
        var_id,
        item_count,
        total_length: size as u16,
        counter,
        flags: 0,
        checksum: 0,
    };
    header.write_into(&mut dst[start..start + HEADER_SIZE]);
    Ok(())
}

/// Decode the header of a received datagram.
///
/// Rejects runt datagrams and datagrams without the identity marker. The
/// length field is not checked against the datagram size here; that belongs
/// to [`crate::inspect::inspect_frame`].
pub fn decode_header(datagram: &[u8]) -> Result<FrameHeader> {
    if datagram.len() < HEADER_SIZE {
        return Err(FrameError::Runt {
            len: datagram.len(),
        });
    }
    if datagram[0..4] != IDENTITY {
        return Err(FrameError::InvalidIdentity);
    }

    let u16_at = |at: usize| u16::from_le_bytes([datagram[at], datagram[at + 1]]);
    Ok(FrameHeader {
        reserved: u32::from_le_bytes([datagram[4], datagram[5], datagram[6], datagram[7]]),
        list_id: u16_at(8),
        var_id: u16_at(10),
        item_count: u16_at(12),
        total_length: u16_at(14),
        counter: u16_at(16),
        flags: datagram[18],
        checksum: datagram[19],
    })
}
