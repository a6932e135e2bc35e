//! Variable kinds carried by network variable lists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of scalar kinds a list variable can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VariableKind {
    Bool,
    Byte,
    Word,
    Dword,
    Time,
    Real,
    Lreal,
    String,
    #[serde(rename = "WSTRING")]
    WString,
}

impl VariableKind {
    /// All kinds, in declaration order.
    pub const ALL: [VariableKind; 9] = [
        VariableKind::Bool,
        VariableKind::Byte,
        VariableKind::Word,
        VariableKind::Dword,
        VariableKind::Time,
        VariableKind::Real,
        VariableKind::Lreal,
        VariableKind::String,
        VariableKind::WString,
    ];

    /// Encoded width in bytes, or `None` for null-terminated kinds.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            VariableKind::Bool | VariableKind::Byte => Some(1),
            VariableKind::Word => Some(2),
            VariableKind::Dword | VariableKind::Time | VariableKind::Real => Some(4),
            VariableKind::Lreal => Some(8),
            VariableKind::String | VariableKind::WString => None,
        }
    }

    /// IEC 61131-3 type name as used in declarations.
    pub fn type_name(self) -> &'static str {
        match self {
            VariableKind::Bool => "BOOL",
            VariableKind::Byte => "BYTE",
            VariableKind::Word => "WORD",
            VariableKind::Dword => "DWORD",
            VariableKind::Time => "TIME",
            VariableKind::Real => "REAL",
            VariableKind::Lreal => "LREAL",
            VariableKind::String => "STRING",
            VariableKind::WString => "WSTRING",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Error returned when a type name is not one of the supported kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variable kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for VariableKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        VariableKind::ALL
            .into_iter()
            .find(|kind| kind.type_name() == upper)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}
