//! Mail module.
//!
//! This module contains the mail service interface consumed by the
//! dispatch engine, the message payload builder and the service
//! implementations.

pub mod memory;
pub mod payload;
pub mod service;
#[cfg(feature = "smtp-service")]
pub mod smtp;

pub use self::memory::{MemoryMailService, StoredMessage};
pub use self::payload::{build_backup_message, build_message, Payload};
pub use self::service::{get_or_create_label, Error, Label, MailService, Result, SentMessage};
#[cfg(feature = "smtp-service")]
pub use self::smtp::{SmtpConfig, SmtpMailService};
