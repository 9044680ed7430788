//! Mail service module.
//!
//! This module exposes the mail service trait, which can be used to
//! plug the dispatch engine onto any remote mailbox offering sending,
//! drafts, labels and header lookups.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::result;
use thiserror::Error;

#[cfg(feature = "smtp-service")]
use super::smtp;

#[derive(Debug, Error)]
pub enum Error {
    #[error("mail service request failed: {0}")]
    RequestError(String),
    #[error("mail service does not support {0}")]
    UnsupportedError(&'static str),
    #[error("cannot find message {0}")]
    FindMessageError(String),

    #[cfg(feature = "smtp-service")]
    #[error(transparent)]
    SmtpError(#[from] smtp::Error),
}

pub type Result<T> = result::Result<T, Error>;

/// Represents a mailbox label.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Represents the identifiers the service assigns to a sent or
/// drafted message.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Represents the service internal message id.
    pub id: String,
    /// Represents the conversation the message belongs to.
    pub thread_id: String,
}

pub trait MailService {
    fn list_labels(&mut self) -> Result<Vec<Label>>;
    fn create_label(&mut self, name: &str) -> Result<String>;

    /// Sends the given raw message, optionally into an existing
    /// conversation.
    fn send(&mut self, raw: &[u8], thread_id: Option<&str>) -> Result<SentMessage>;
    fn create_draft(&mut self, raw: &[u8]) -> Result<SentMessage>;

    /// Gets a header of a message. Services may need some time before
    /// headers of a freshly sent message are available.
    fn get_message_header(&mut self, id: &str, name: &str) -> Result<Option<String>>;

    fn batch_add_label(&mut self, ids: &[String], label_id: &str) -> Result<()>;

    /// Sends the given attachment to the mailbox owner.
    fn send_self(&mut self, attachment: &[u8], filename: &str) -> Result<()>;
}

/// Gets the id of the label matching the given name (case
/// insensitive), creating it when it does not exist yet.
pub fn get_or_create_label<S: MailService + ?Sized>(service: &mut S, name: &str) -> Result<String> {
    trace!(">> get or create label {:?}", name);

    let existing = service
        .list_labels()?
        .into_iter()
        .find(|label| label.name.to_lowercase() == name.to_lowercase());

    let id = match existing {
        Some(label) => {
            debug!("found label {:?} with id {}", label.name, label.id);
            label.id
        }
        None => {
            let id = service.create_label(name)?;
            debug!("created label {:?} with id {}", name, id);
            id
        }
    };

    trace!("<< get or create label");
    Ok(id)
}
