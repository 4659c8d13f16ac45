//! Validation feedback attached to a record.
//!
//! Hooks never fail with an `Err` the host has to handle: every problem they
//! find is a [`Message`], attached either to a [`Field`] of the record or to
//! the record as a whole (a *global* error). Each step returns its own
//! [`ValidationErrors`] and the caller merges them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of a single validation step.
pub type ValidationResult = Result<(), ValidationErrors>;

/// Fields of an interval record that errors can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    DateFrom,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::DateFrom => "dateFrom",
        }
    }
}

/// A user-facing validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// `date_to` lies before `date_from`.
    DatesInvalid,
    /// Another component of the same group already covers `date_from`.
    OtherComponentsExist,
    /// A closed interval cannot be removed from the chain.
    HasDates,
    /// The data layer failed while persisting a neighbour.
    Storage(String),
}

impl Message {
    /// Stable localisation key for hosts that translate messages.
    pub fn key(&self) -> &'static str {
        match self {
            Message::DatesInvalid => "productionLines.workstationTypeComponent.validation.datesInvalid",
            Message::OtherComponentsExist => {
                "productionLines.workstationTypeComponent.validation.otherComponentsExist"
            }
            Message::HasDates => "productionLines.workstationTypeComponent.onDelete.hasDates",
            Message::Storage(_) => "productionLines.workstationTypeComponent.storageError",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::DatesInvalid => write!(f, "dates invalid"),
            Message::OtherComponentsExist => write!(f, "other components exist for this time"),
            Message::HasDates => write!(f, "cannot delete: record has both dates set"),
            Message::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

/// Field-level and global errors collected for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    fields: Vec<(Field, Message)>,
    global: Vec<Message>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(field: Field, message: Message) -> Self {
        let mut errors = Self::new();
        errors.add_field(field, message);
        errors
    }

    pub fn global(message: Message) -> Self {
        let mut errors = Self::new();
        errors.add_global(message);
        errors
    }

    pub fn add_field(&mut self, field: Field, message: Message) {
        self.fields.push((field, message));
    }

    pub fn add_global(&mut self, message: Message) {
        self.global.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.global.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.global.len()
    }

    pub fn field_errors(&self) -> &[(Field, Message)] {
        &self.fields
    }

    pub fn global_errors(&self) -> &[Message] {
        &self.global
    }

    pub fn for_field(&self, field: Field) -> impl Iterator<Item = &Message> {
        self.fields
            .iter()
            .filter(move |(f, _)| *f == field)
            .map(|(_, m)| m)
    }

    /// Every message regardless of where it was attached, field errors first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.fields.iter().map(|(_, m)| m).chain(self.global.iter())
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.fields.extend(other.fields);
        self.global.extend(other.global);
    }

    /// Fold a step's result into this accumulator.
    pub fn absorb(&mut self, result: ValidationResult) {
        if let Err(errors) = result {
            self.merge(errors);
        }
    }

    pub fn into_result(self) -> ValidationResult {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {message}", field.name())?;
            first = false;
        }
        for message in &self.global {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
