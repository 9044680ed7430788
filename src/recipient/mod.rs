//! Recipient module.
//!
//! This module contains everything related to the recipient table:
//! the address classifier, the rows with their delivery state and the
//! table itself.

pub mod address;
pub mod row;
pub mod table;

pub use self::address::extract_address;
pub use self::row::{
    Outcome, Row, Status, EMAIL_FIELD, RESERVED_FIELDS, RFC_MESSAGE_ID_FIELD, STATUS_FIELD,
    THREAD_ID_FIELD,
};
pub use self::table::{pending_rows, Error, Result, Table};
