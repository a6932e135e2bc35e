//! Strict frame integrity checks.
//!
//! The live update path only needs the 20-byte/identity gate. This module is
//! for ingestion boundaries (tests, logging, the CLI `inspect` command) where
//! a frame should be checked against the list layout it claims to carry.

use serde::Serialize;

use crate::codec::{FrameHeader, HEADER_SIZE, IDENTITY};
use crate::error::FrameError;
use crate::kind::VariableKind;
use crate::value::{decode_value, Value};

/// One declared field of a list, as needed to walk a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub name: String,
    pub idx: u16,
    pub kind: VariableKind,
}

impl FieldLayout {
    pub fn new(name: impl Into<String>, idx: u16, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            idx,
            kind,
        }
    }
}

/// Something wrong with an inspected frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum IntegrityProblem {
    /// Shorter than the fixed header; nothing else was checked.
    Runt { len: usize },
    /// The first four bytes are not `00 2D 53 33`.
    IdentityMismatch { found: [u8; 4] },
    /// The header length field disagrees with the datagram size.
    LengthMismatch { header: u16, actual: usize },
    /// Single-variable frame addressed to an idx the layout does not declare.
    UnknownVariable { var_id: u16 },
    /// A field could not be decoded; the walk stopped here.
    FieldDecode {
        name: String,
        #[serde(serialize_with = "serialize_display")]
        error: FrameError,
    },
    /// Decoding the layout read past the header length.
    PayloadOverrun { parsed: usize, length: u16 },
}

/// Result of [`inspect_frame`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    /// Header fields, present unless the datagram is a runt.
    pub header: Option<FrameHeader>,
    /// Decoded fields in payload order.
    pub fields: Vec<(String, Value)>,
    pub problems: Vec<IntegrityProblem>,
}

impl FrameReport {
    /// True if no integrity problem was found.
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    /// Decoded value of a field, if it was reached.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// Inspect a datagram against a list layout.
///
/// Packed frames are walked over `layout` sorted by ascending idx. Single
/// frames are decoded against the layout entry whose idx equals the var id.
pub fn inspect_frame(datagram: &[u8], layout: &[FieldLayout]) -> FrameReport {
    let mut report = FrameReport {
        header: None,
        fields: Vec::new(),
        problems: Vec::new(),
    };

    if datagram.len() < HEADER_SIZE {
        report.problems.push(IntegrityProblem::Runt {
            len: datagram.len(),
        });
        return report;
    }

    let found = [datagram[0], datagram[1], datagram[2], datagram[3]];
    if found != IDENTITY {
        report
            .problems
            .push(IntegrityProblem::IdentityMismatch { found });
    }

    // Decode the header fields even when the identity is foreign.
    let mut patched = datagram[..HEADER_SIZE].to_vec();
    patched[0..4].copy_from_slice(&IDENTITY);
    let header = match crate::codec::decode_header(&patched) {
        Ok(header) => header,
        Err(_) => return report,
    };
    report.header = Some(header);

    if header.total_length as usize != datagram.len() {
        report.problems.push(IntegrityProblem::LengthMismatch {
            header: header.total_length,
            actual: datagram.len(),
        });
    }

    let payload = header.payload(datagram);
    let fields: Vec<&FieldLayout> = if header.is_packed() {
        let mut sorted: Vec<&FieldLayout> = layout.iter().collect();
        sorted.sort_by_key(|field| field.idx);
        sorted
    } else {
        match layout.iter().find(|field| field.idx == header.var_id) {
            Some(field) => vec![field],
            None => {
                report.problems.push(IntegrityProblem::UnknownVariable {
                    var_id: header.var_id,
                });
                Vec::new()
            }
        }
    };

    let mut offset = 0usize;
    for field in fields {
        match decode_value(field.kind, payload, offset) {
            Ok((value, consumed)) => {
                offset += consumed;
                report.fields.push((field.name.clone(), value));
            }
            Err(error) => {
                report.problems.push(IntegrityProblem::FieldDecode {
                    name: field.name.clone(),
                    error,
                });
                break;
            }
        }
    }

    let parsed = HEADER_SIZE + offset;
    if parsed > header.total_length as usize {
        report.problems.push(IntegrityProblem::PayloadOverrun {
            parsed,
            length: header.total_length,
        });
    }

    report
}

fn serialize_display<S: serde::Serializer>(
    error: &FrameError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_packed, encode_single};
    use crate::value::VariableSlot;

    fn layout() -> Vec<FieldLayout> {
        vec![
            FieldLayout::new("counter", 3, VariableKind::Dword),
            FieldLayout::new("emergency", 1, VariableKind::Bool),
            FieldLayout::new("working", 2, VariableKind::Word),
        ]
    }

    fn packed_frame() -> BytesMut {
        let slots = [
            VariableSlot::new(1, Value::Bool(true)),
            VariableSlot::new(2, Value::Word(7)),
            VariableSlot::new(3, Value::Dword(1425)),
        ];
        let mut buf = BytesMut::new();
        encode_packed(1, 1, &slots, &mut buf).unwrap();
        buf
    }

    #[test]
    fn well_formed_packed_frame_is_valid() {
        let frame = packed_frame();
        let report = inspect_frame(&frame, &layout());

        assert!(report.is_valid(), "{:?}", report.problems);
        assert_eq!(report.field("emergency"), Some(&Value::Bool(true)));
        assert_eq!(report.field("working"), Some(&Value::Word(7)));
        assert_eq!(report.field("counter"), Some(&Value::Dword(1425)));
        let names: Vec<&str> = report.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["emergency", "working", "counter"]);
    }

    #[test]
    fn single_frame_uses_addressed_field() {
        let mut frame = BytesMut::new();
        encode_single(1, &VariableSlot::new(2, Value::Word(-3)), 5, &mut frame).unwrap();
        let report = inspect_frame(&frame, &layout());

        assert!(report.is_valid());
        assert_eq!(report.fields, vec![("working".to_string(), Value::Word(-3))]);
    }

    #[test]
    fn identity_and_length_mismatches_are_reported() {
        let mut frame = packed_frame().to_vec();
        frame[1] = 0x2e;
        frame.push(0xAA);
        let report = inspect_frame(&frame, &layout());

        assert!(!report.is_valid());
        assert!(report
            .problems
            .contains(&IntegrityProblem::IdentityMismatch {
                found: [0x00, 0x2e, 0x53, 0x33]
            }));
        assert!(report.problems.contains(&IntegrityProblem::LengthMismatch {
            header: 27,
            actual: 28
        }));
        assert!(report.header.is_some());
    }

    #[test]
    fn truncated_payload_reports_field_decode() {
        let frame = packed_frame();
        let short = &frame[..frame.len() - 2];
        let report = inspect_frame(short, &layout());

        assert!(report
            .problems
            .iter()
            .any(|p| matches!(p, IntegrityProblem::FieldDecode { name, .. } if name == "counter")));
        assert_eq!(report.fields.len(), 2);
    }

    #[test]
    fn overrun_is_reported_when_layout_exceeds_length() {
        let mut frame = packed_frame().to_vec();
        // Claim a shorter frame than the layout needs.
        frame[14] = 22;
        let report = inspect_frame(&frame, &layout());
        assert!(report
            .problems
            .contains(&IntegrityProblem::PayloadOverrun {
                parsed: 27,
                length: 22
            }));
    }

    #[test]
    fn unknown_single_variable_is_reported() {
        let mut frame = BytesMut::new();
        encode_single(1, &VariableSlot::new(9, Value::Byte(1)), 0, &mut frame).unwrap();
        let report = inspect_frame(&frame, &layout());
        assert_eq!(
            report.problems,
            vec![IntegrityProblem::UnknownVariable { var_id: 9 }]
        );
    }

    #[test]
    fn runt_stops_inspection() {
        let report = inspect_frame(&[0u8; 10], &layout());
        assert_eq!(report.problems, vec![IntegrityProblem::Runt { len: 10 }]);
        assert!(report.header.is_none());
    }

    #[test]
    fn report_serializes_to_json() {
        let report = inspect_frame(&packed_frame(), &layout());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["header"]["item_count"], 3);
        assert_eq!(json["problems"].as_array().unwrap().len(), 0);
    }
}
