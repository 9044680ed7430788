//! In-memory mail service module.
//!
//! This module contains a mail service keeping everything in memory.
//! It is used for dry runs: messages are parsed and recorded but
//! never leave the process.

use log::{debug, warn};
use mailparse::MailHeaderMap;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::service::{Error, Label, MailService, Result, SentMessage};

/// Represents a message recorded by the in-memory service.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    pub to: String,
    pub subject: String,
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryMailService {
    pub labels: Vec<Label>,
    pub sent: Vec<StoredMessage>,
    pub drafts: Vec<StoredMessage>,
    /// Represents the message ids attached to each label id.
    pub labeled: HashMap<String, Vec<String>>,
    /// Represents the backups received by the mailbox owner.
    pub backups: Vec<(String, Vec<u8>)>,
    /// Represents the amount of requests made to the service.
    pub requests: usize,

    failing_recipients: HashSet<String>,
    header_delay: usize,
    header_polls: HashMap<String, usize>,
    headers_unavailable: bool,
    labels_unavailable: bool,
    backup_unavailable: bool,
}

impl MemoryMailService {
    /// Makes every request sending or drafting a message to the given
    /// address fail.
    pub fn fail_for<S: ToString>(mut self, addr: S) -> Self {
        self.failing_recipients.insert(addr.to_string());
        self
    }

    /// Makes headers of a message available only after the given
    /// amount of lookups returned nothing.
    pub fn header_delay(mut self, polls: usize) -> Self {
        self.header_delay = polls;
        self
    }

    /// Makes every header lookup fail.
    pub fn headers_unavailable(mut self) -> Self {
        self.headers_unavailable = true;
        self
    }

    /// Makes label requests fail.
    pub fn labels_unavailable(mut self) -> Self {
        self.labels_unavailable = true;
        self
    }

    /// Makes backup delivery fail.
    pub fn backup_unavailable(mut self) -> Self {
        self.backup_unavailable = true;
        self
    }

    pub fn message(&self, id: &str) -> Option<&StoredMessage> {
        self.sent.iter().chain(self.drafts.iter()).find(|msg| msg.id == id)
    }

    fn store(&mut self, raw: &[u8], thread_id: Option<&str>) -> Result<StoredMessage> {
        let parsed = mailparse::parse_mail(raw)
            .map_err(|err| Error::RequestError(format!("cannot parse message: {}", err)))?;
        let to = parsed.headers.get_first_value("To").unwrap_or_default();

        if self.failing_recipients.contains(&to) {
            return Err(Error::RequestError(format!("recipient {} rejected", to)));
        }

        let id = Uuid::new_v4().to_simple().to_string();
        let msg = StoredMessage {
            thread_id: thread_id
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| Uuid::new_v4().to_simple().to_string()),
            subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
            message_id: parsed
                .headers
                .get_first_value("Message-ID")
                .unwrap_or_else(|| format!("<{}@memory.localhost>", id)),
            in_reply_to: parsed.headers.get_first_value("In-Reply-To"),
            references: parsed.headers.get_first_value("References"),
            raw: raw.to_vec(),
            to,
            id,
        };
        debug!("stored message {} to {}", msg.id, msg.to);
        Ok(msg)
    }
}

impl MailService for MemoryMailService {
    fn list_labels(&mut self) -> Result<Vec<Label>> {
        self.requests += 1;
        if self.labels_unavailable {
            return Err(Error::UnsupportedError("labels"));
        }
        Ok(self.labels.clone())
    }

    fn create_label(&mut self, name: &str) -> Result<String> {
        self.requests += 1;
        if self.labels_unavailable {
            return Err(Error::UnsupportedError("labels"));
        }
        let id = format!("Label_{}", self.labels.len() + 1);
        self.labels.push(Label {
            id: id.clone(),
            name: name.to_owned(),
        });
        Ok(id)
    }

    fn send(&mut self, raw: &[u8], thread_id: Option<&str>) -> Result<SentMessage> {
        self.requests += 1;
        let msg = self.store(raw, thread_id)?;
        let sent = SentMessage {
            id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
        };
        self.sent.push(msg);
        Ok(sent)
    }

    fn create_draft(&mut self, raw: &[u8]) -> Result<SentMessage> {
        self.requests += 1;
        let msg = self.store(raw, None)?;
        let draft = SentMessage {
            id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
        };
        self.drafts.push(msg);
        Ok(draft)
    }

    fn get_message_header(&mut self, id: &str, name: &str) -> Result<Option<String>> {
        self.requests += 1;
        if self.headers_unavailable {
            return Err(Error::RequestError(String::from("headers unavailable")));
        }

        let polls = self.header_polls.entry(id.to_owned()).or_default();
        *polls += 1;
        if *polls <= self.header_delay {
            return Ok(None);
        }

        let msg = self
            .message(id)
            .ok_or_else(|| Error::FindMessageError(id.to_owned()))?;
        let header = mailparse::parse_headers(&msg.raw)
            .map_err(|err| Error::RequestError(format!("cannot parse headers: {}", err)))?
            .0
            .get_first_value(name);
        Ok(header)
    }

    fn batch_add_label(&mut self, ids: &[String], label_id: &str) -> Result<()> {
        self.requests += 1;
        if self.labels_unavailable {
            return Err(Error::UnsupportedError("labels"));
        }
        self.labeled
            .entry(label_id.to_owned())
            .or_default()
            .extend(ids.iter().cloned());
        Ok(())
    }

    fn send_self(&mut self, attachment: &[u8], filename: &str) -> Result<()> {
        self.requests += 1;
        if self.backup_unavailable {
            warn!("backup of {} rejected", filename);
            return Err(Error::RequestError(String::from("backup rejected")));
        }
        self.backups.push((filename.to_owned(), attachment.to_vec()));
        Ok(())
    }
}
