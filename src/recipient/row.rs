//! Row module.
//!
//! A row is one recipient record: open-ended named string fields plus
//! the reserved fields tracking its delivery state.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, iter::FromIterator};

use crate::template::Fields;

pub const EMAIL_FIELD: &str = "Email";
pub const THREAD_ID_FIELD: &str = "ThreadId";
pub const RFC_MESSAGE_ID_FIELD: &str = "RfcMessageId";
pub const STATUS_FIELD: &str = "Status";

/// Fields every table carries, initialized to empty when missing.
pub const RESERVED_FIELDS: [&str; 3] = [THREAD_ID_FIELD, RFC_MESSAGE_ID_FIELD, STATUS_FIELD];

/// Represents the delivery state of a row.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Status {
    #[default]
    Pending,
    Sent,
    Draft,
    Skipped,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "",
            Self::Sent => "Sent",
            Self::Draft => "Draft",
            Self::Skipped => "Skipped",
            Self::Error => "Error",
        }
    }

    /// Unknown status text counts as pending so that the row is
    /// considered again.
    pub fn parse(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "sent" => Self::Sent,
            "draft" => Self::Draft,
            "skipped" => Self::Skipped,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents the result of one dispatch attempt, written to a row
/// in a single update.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    Skipped,
    Draft,
    Sent {
        thread_id: String,
        rfc_message_id: String,
    },
    Error,
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Self::Skipped => Status::Skipped,
            Self::Draft => Status::Draft,
            Self::Sent { .. } => Status::Sent,
            Self::Error => Status::Error,
        }
    }
}

/// Represents a recipient row.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: HashMap<String, String>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Gets the trimmed value of the given field, empty when missing.
    pub fn get_trimmed(&self, name: &str) -> &str {
        self.get(name).map(str::trim).unwrap_or_default()
    }

    pub fn set<K: ToString, V: ToString>(&mut self, name: K, value: V) {
        self.fields.insert(name.to_string(), value.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn email(&self) -> &str {
        self.get(EMAIL_FIELD).unwrap_or_default()
    }

    pub fn status(&self) -> Status {
        Status::parse(self.get_trimmed(STATUS_FIELD))
    }

    pub fn thread_id(&self) -> &str {
        self.get_trimmed(THREAD_ID_FIELD)
    }

    pub fn rfc_message_id(&self) -> &str {
        self.get_trimmed(RFC_MESSAGE_ID_FIELD)
    }

    /// Gets the conversation the row belongs to, when both the thread
    /// id and the protocol message id are known.
    pub fn conversation(&self) -> Option<(&str, &str)> {
        match (self.thread_id(), self.rfc_message_id()) {
            ("", _) | (_, "") => None,
            (thread_id, rfc_message_id) => Some((thread_id, rfc_message_id)),
        }
    }

    pub(crate) fn init_reserved_fields(&mut self) {
        for name in RESERVED_FIELDS {
            self.fields.entry(name.to_owned()).or_default();
        }
    }

    pub(crate) fn apply(&mut self, outcome: &Outcome) {
        if let Outcome::Sent {
            thread_id,
            rfc_message_id,
        } = outcome
        {
            self.set(THREAD_ID_FIELD, thread_id);
            self.set(RFC_MESSAGE_ID_FIELD, rfc_message_id);
        }
        self.set(STATUS_FIELD, outcome.status());
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut row = Row::default();
        for (name, value) in iter {
            row.set(name, value);
        }
        row
    }
}

impl Fields for Row {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}
