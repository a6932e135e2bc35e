use std::collections::HashMap;

use netvar_frame::{Value, VariableKind, VariableSlot};

use crate::declaration::Declaration;

/// Outcome of [`ValueTable::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// The value was stored; `previous` is what it replaced.
    Applied { previous: Value },
    /// No variable by that name.
    UnknownName,
    /// The value's kind differs from the declared kind; nothing changed.
    KindMismatch {
        expected: VariableKind,
        rejected: Value,
    },
}

/// Name-keyed variable slots.
///
/// A list keeps two of these: the pending table written by local sets and
/// sent on the wire, and the live table mirroring the last known state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTable {
    slots: HashMap<String, VariableSlot>,
}

impl ValueTable {
    pub fn from_declaration(declaration: &Declaration) -> Self {
        let slots = declaration
            .entries()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        Self { slots }
    }

    pub fn get(&self, name: &str) -> Option<&VariableSlot> {
        self.slots.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(VariableSlot::value)
    }

    /// Store `value` under `name` if the name is declared and the kind matches.
    pub fn update(&mut self, name: &str, value: Value) -> Update {
        let Some(slot) = self.slots.get_mut(name) else {
            return Update::UnknownName;
        };
        let expected = slot.kind();
        match slot.set_value(value) {
            Ok(previous) => Update::Applied { previous },
            Err(rejected) => Update::KindMismatch { expected, rejected },
        }
    }

    /// Copy the value of `name` from `other`. Returns false if either table
    /// lacks the name.
    pub fn commit_from(&mut self, other: &ValueTable, name: &str) -> bool {
        match other.value(name) {
            Some(value) => matches!(self.update(name, value.clone()), Update::Applied { .. }),
            None => false,
        }
    }

    /// Slots for `names`, in that order, skipping unknown names.
    pub fn slots_in<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a VariableSlot> {
        names.iter().filter_map(move |name| self.slots.get(name))
    }
}
