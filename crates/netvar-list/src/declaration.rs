//! Variable list declarations.

use std::collections::HashSet;

use netvar_frame::{Value, VariableKind, VariableSlot};
use serde::{Deserialize, Serialize};

use crate::error::{ListError, Result};

/// An ordered set of named variables with wire index, kind and initial value.
///
/// Built with the kind-specific helpers:
///
/// ```
/// use netvar_list::Declaration;
///
/// let declaration = Declaration::new()
///     .bool("emergency", 1, false)
///     .word("working", 2, 0)
///     .string("label", 3, "idle");
/// assert_eq!(declaration.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration {
    entries: Vec<(String, VariableSlot)>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable whose kind is taken from `value`.
    pub fn var(mut self, name: impl Into<String>, idx: u16, value: Value) -> Self {
        self.push(name, VariableSlot::new(idx, value));
        self
    }

    pub fn bool(self, name: impl Into<String>, idx: u16, value: bool) -> Self {
        self.var(name, idx, Value::Bool(value))
    }

    pub fn byte(self, name: impl Into<String>, idx: u16, value: i8) -> Self {
        self.var(name, idx, Value::Byte(value))
    }

    pub fn word(self, name: impl Into<String>, idx: u16, value: i16) -> Self {
        self.var(name, idx, Value::Word(value))
    }

    pub fn dword(self, name: impl Into<String>, idx: u16, value: i32) -> Self {
        self.var(name, idx, Value::Dword(value))
    }

    /// TIME in milliseconds.
    pub fn time(self, name: impl Into<String>, idx: u16, millis: i32) -> Self {
        self.var(name, idx, Value::Time(millis))
    }

    pub fn real(self, name: impl Into<String>, idx: u16, value: f32) -> Self {
        self.var(name, idx, Value::Real(value))
    }

    pub fn lreal(self, name: impl Into<String>, idx: u16, value: f64) -> Self {
        self.var(name, idx, Value::Lreal(value))
    }

    pub fn string(self, name: impl Into<String>, idx: u16, value: impl Into<String>) -> Self {
        self.var(name, idx, Value::String(value.into()))
    }

    pub fn wstring(self, name: impl Into<String>, idx: u16, value: impl Into<String>) -> Self {
        self.var(name, idx, Value::WString(value.into()))
    }

    /// Append a prepared slot.
    pub fn push(&mut self, name: impl Into<String>, slot: VariableSlot) {
        self.entries.push((name.into(), slot));
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[(String, VariableSlot)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail on the first name declared twice.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for (name, _) in &self.entries {
            if !seen.insert(name.as_str()) {
                return Err(ListError::DuplicateVariable(name.clone()));
            }
        }
        Ok(())
    }

    /// Build a declaration from serialized entries.
    pub fn from_entries(entries: Vec<DeclarationEntry>) -> Result<Self> {
        let mut declaration = Self::new();
        for entry in entries {
            let value = entry.initial_value()?;
            declaration.push(entry.name, VariableSlot::new(entry.idx, value));
        }
        declaration.validate()?;
        Ok(declaration)
    }

    /// Parse a JSON array of [`DeclarationEntry`] objects.
    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<DeclarationEntry> = serde_json::from_str(text)
            .map_err(|err| ListError::InvalidDeclaration(err.to_string()))?;
        Self::from_entries(entries)
    }
}

/// Serialized form of one declared variable.
///
/// ```json
/// { "name": "working", "idx": 2, "kind": "WORD", "value": 0 }
/// ```
///
/// `value` may be a JSON bool, number or string. Strings are parsed as IEC
/// literals for numeric kinds (`16#FF` is accepted). A missing value is the
/// zero value of the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationEntry {
    pub name: String,
    pub idx: u16,
    pub kind: VariableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl DeclarationEntry {
    fn initial_value(&self) -> Result<Value> {
        let invalid = |detail: String| {
            ListError::InvalidDeclaration(format!("variable {:?}: {detail}", self.name))
        };
        let text = match &self.value {
            None | Some(serde_json::Value::Null) => return Ok(Value::default_for(self.kind)),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => return Err(invalid(format!("unsupported value {other}"))),
        };
        Value::parse(self.kind, &text).map_err(|err| invalid(err.to_string()))
    }
}
