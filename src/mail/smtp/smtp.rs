//! SMTP module.
//!
//! This module contains the SMTP mail service. SMTP only transmits
//! messages: drafts are written to a local directory, labels are not
//! supported, and the Message-ID header is read from the raw message
//! at sending time.

use chrono::Local;
use lettre::{
    self,
    address::Envelope,
    transport::smtp::{
        client::{Tls, TlsParameters},
        SmtpTransport,
    },
    Address, Transport,
};
use log::{debug, info, trace};
use mailparse::MailHeaderMap;
use std::{collections::HashMap, fs, io, path::PathBuf, result};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    mail::{build_backup_message, payload, service, Label, MailService, SentMessage},
    process, SmtpConfig,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build smtp transport relay")]
    BuildTransportRelayError(#[source] lettre::transport::smtp::Error),
    #[error("cannot build smtp tls parameters")]
    BuildTlsParamsError(#[source] lettre::transport::smtp::Error),
    #[error("cannot get smtp password")]
    GetPasswdError(#[source] process::Error),
    #[error("cannot get smtp password: password is empty")]
    GetPasswdEmptyError,
    #[error("cannot parse message before sending")]
    ParseEmailError(#[source] mailparse::MailParseError),
    #[error("cannot find {0} header of message")]
    FindHeaderError(&'static str),
    #[error("cannot parse address {1:?}")]
    ParseAddressError(#[source] lettre::address::AddressError, String),
    #[error("cannot build envelope")]
    BuildEnvelopeError(#[source] lettre::error::Error),
    #[error("cannot send message")]
    SendError(#[source] lettre::transport::smtp::Error),
    #[error("cannot create drafts directory {1}")]
    CreateDraftsDirError(#[source] io::Error, PathBuf),
    #[error("cannot write draft {1}")]
    WriteDraftError(#[source] io::Error, PathBuf),

    #[error(transparent)]
    PayloadError(#[from] payload::Error),
}

pub type Result<T> = result::Result<T, Error>;

pub struct SmtpMailService<'a> {
    config: &'a SmtpConfig,
    owner: String,
    transport: Option<SmtpTransport>,
    /// Represents the Message-ID header of every sent message, by id.
    message_ids: HashMap<String, String>,
}

impl<'a> SmtpMailService<'a> {
    /// Creates a new SMTP mail service for the mailbox owned by the
    /// given address.
    pub fn new<S: ToString>(config: &'a SmtpConfig, owner: S) -> Self {
        Self {
            config,
            owner: owner.to_string(),
            transport: None,
            message_ids: HashMap::new(),
        }
    }

    fn build_transport(&self) -> Result<SmtpTransport> {
        let builder = if self.config.ssl() {
            let tls = TlsParameters::builder(self.config.host.to_owned())
                .dangerous_accept_invalid_hostnames(self.config.insecure())
                .dangerous_accept_invalid_certs(self.config.insecure())
                .build()
                .map_err(Error::BuildTlsParamsError)?;

            if self.config.starttls() {
                SmtpTransport::starttls_relay(&self.config.host)
                    .map_err(Error::BuildTransportRelayError)?
                    .tls(Tls::Required(tls))
            } else {
                SmtpTransport::relay(&self.config.host)
                    .map_err(Error::BuildTransportRelayError)?
                    .tls(Tls::Wrapper(tls))
            }
        } else {
            SmtpTransport::relay(&self.config.host)
                .map_err(Error::BuildTransportRelayError)?
                .tls(Tls::None)
        };

        Ok(builder
            .port(self.config.port)
            .credentials(self.config.credentials()?)
            .build())
    }

    fn transport(&mut self) -> Result<&SmtpTransport> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => self.build_transport()?,
        };
        let transport: &SmtpTransport = self.transport.insert(transport);
        Ok(transport)
    }

    fn send_raw(&mut self, raw: &[u8]) -> Result<String> {
        trace!(">> send raw message over smtp");

        let parsed = mailparse::parse_mail(raw).map_err(Error::ParseEmailError)?;
        let from = parsed
            .headers
            .get_first_value("From")
            .ok_or(Error::FindHeaderError("From"))?;
        let to = parsed
            .headers
            .get_first_value("To")
            .ok_or(Error::FindHeaderError("To"))?;
        let message_id = parsed
            .headers
            .get_first_value("Message-ID")
            .ok_or(Error::FindHeaderError("Message-ID"))?;

        let envelope = Envelope::new(Some(parse_addr(&from)?), vec![parse_addr(&to)?])
            .map_err(Error::BuildEnvelopeError)?;

        self.transport()?
            .send_raw(&envelope, raw)
            .map_err(Error::SendError)?;

        debug!("sent message {} to {}", message_id, to);
        trace!("<< send raw message over smtp");
        Ok(message_id)
    }
}

/// Parses the bare address out of a mailbox header value.
fn parse_addr(mbox: &str) -> Result<Address> {
    let addr = mailparse::addrparse(mbox)
        .ok()
        .and_then(|addrs| addrs.extract_single_info())
        .map(|info| info.addr)
        .unwrap_or_else(|| mbox.trim().to_owned());
    addr.parse::<Address>()
        .map_err(|err| Error::ParseAddressError(err, addr.to_owned()))
}

impl<'a> MailService for SmtpMailService<'a> {
    fn list_labels(&mut self) -> service::Result<Vec<Label>> {
        Err(service::Error::UnsupportedError("labels over smtp"))
    }

    fn create_label(&mut self, _name: &str) -> service::Result<String> {
        Err(service::Error::UnsupportedError("labels over smtp"))
    }

    /// Sends the message. The thread id of a new conversation is the
    /// Message-ID of its first message.
    fn send(&mut self, raw: &[u8], thread_id: Option<&str>) -> service::Result<SentMessage> {
        let message_id = self.send_raw(raw)?;
        let id = Uuid::new_v4().to_simple().to_string();
        self.message_ids.insert(id.clone(), message_id.clone());

        Ok(SentMessage {
            id,
            thread_id: thread_id.map(ToOwned::to_owned).unwrap_or(message_id),
        })
    }

    fn create_draft(&mut self, raw: &[u8]) -> service::Result<SentMessage> {
        let dir = self.config.drafts_dir();
        fs::create_dir_all(&dir).map_err(|err| Error::CreateDraftsDirError(err, dir.clone()))?;

        let id = Uuid::new_v4().to_simple().to_string();
        let path = dir.join(format!("{}.eml", id));
        fs::write(&path, raw).map_err(|err| Error::WriteDraftError(err, path.clone()))?;
        info!("draft written at {:?}", path);

        Ok(SentMessage {
            thread_id: id.clone(),
            id,
        })
    }

    fn get_message_header(&mut self, id: &str, name: &str) -> service::Result<Option<String>> {
        if !name.eq_ignore_ascii_case("message-id") {
            return Ok(None);
        }
        self.message_ids
            .get(id)
            .cloned()
            .map(Some)
            .ok_or_else(|| service::Error::FindMessageError(id.to_owned()))
    }

    fn batch_add_label(&mut self, _ids: &[String], _label_id: &str) -> service::Result<()> {
        Err(service::Error::UnsupportedError("labels over smtp"))
    }

    fn send_self(&mut self, attachment: &[u8], filename: &str) -> service::Result<()> {
        let raw = build_backup_message(&self.owner, attachment, filename, Local::now())
            .map_err(Error::PayloadError)?;
        self.send_raw(&raw)?;
        Ok(())
    }
}
