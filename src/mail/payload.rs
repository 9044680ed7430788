//! Payload module.
//!
//! This module builds the raw RFC 5322 messages handed over to the
//! mail service.

use chrono::{DateTime, Local};
use lettre::message::{
    header::{ContentTransferEncoding, ContentType},
    Attachment, Body, Mailbox, MultiPart, SinglePart,
};
use log::trace;
use std::result;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot parse sender address {1:?}")]
    ParseFromError(#[source] lettre::address::AddressError, String),
    #[error("cannot parse recipient address {1:?}")]
    ParseToError(#[source] lettre::address::AddressError, String),
    #[error("cannot parse content type of attachment {1}")]
    ParseAttachmentContentTypeError(#[source] lettre::message::header::ContentTypeErr, String),
    #[error("cannot encode attachment {0}")]
    EncodeAttachmentError(String),
    #[error("cannot build message")]
    BuildMessageError(#[source] lettre::error::Error),
}

pub type Result<T> = result::Result<T, Error>;

/// Represents a message ready to be handed over to the mail service.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Payload {
    pub raw: Vec<u8>,
    /// Represents the conversation the message replies into, if any.
    pub thread_id: Option<String>,
}

/// Builds an HTML message. When a conversation `(thread id, protocol
/// message id)` is given, the message replies into it.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    html: &str,
    conversation: Option<(&str, &str)>,
) -> Result<Payload> {
    trace!(">> build message to {}", to);

    let from: Mailbox = from
        .parse()
        .map_err(|err| Error::ParseFromError(err, from.to_owned()))?;
    let to: Mailbox = to
        .parse()
        .map_err(|err| Error::ParseToError(err, to.to_owned()))?;

    let mut builder = lettre::Message::builder()
        .message_id(None)
        .from(from)
        .to(to)
        .subject(subject);

    let mut thread_id = None;
    if let Some((id, rfc_message_id)) = conversation {
        builder = builder
            .in_reply_to(rfc_message_id.to_owned())
            .references(rfc_message_id.to_owned());
        thread_id = Some(id.to_owned());
    }

    let msg = builder
        .header(ContentType::TEXT_HTML)
        .body(html.to_owned())
        .map_err(Error::BuildMessageError)?;

    trace!("<< build message");
    Ok(Payload {
        raw: msg.formatted(),
        thread_id,
    })
}

/// Builds the message carrying the updated recipient table to the
/// mailbox owner.
pub fn build_backup_message(
    addr: &str,
    attachment: &[u8],
    filename: &str,
    date: DateTime<Local>,
) -> Result<Vec<u8>> {
    let mbox: Mailbox = addr
        .parse()
        .map_err(|err| Error::ParseToError(err, addr.to_owned()))?;
    let content_type = ContentType::parse("text/csv")
        .map_err(|err| Error::ParseAttachmentContentTypeError(err, filename.to_owned()))?;

    // base64 keeps the table bytes untouched, line endings included
    let body = Body::new_with_encoding(attachment.to_vec(), ContentTransferEncoding::Base64)
        .map_err(|_| Error::EncodeAttachmentError(filename.to_owned()))?;

    let multipart = MultiPart::mixed()
        .singlepart(SinglePart::plain(String::from(
            "Attached is the backup CSV for your mail merge run.",
        )))
        .singlepart(Attachment::new(filename.to_owned()).body(body, content_type));

    let msg = lettre::Message::builder()
        .message_id(None)
        .from(mbox.clone())
        .to(mbox)
        .subject(format!(
            "Mail Merge Backup CSV - {}",
            date.format("%Y-%m-%d %H:%M")
        ))
        .multipart(multipart)
        .map_err(Error::BuildMessageError)?;

    Ok(msg.formatted())
}

#[cfg(test)]
mod tests {
    use mailparse::MailHeaderMap;

    use super::*;

    #[test]
    fn build_new_message() {
        let payload = build_message(
            "me@localhost.com",
            "a@x.com",
            "Hello Sam",
            "<b>Hi</b>",
            None,
        )
        .unwrap();
        assert_eq!(None, payload.thread_id);

        let parsed = mailparse::parse_mail(&payload.raw).unwrap();
        assert_eq!(Some("a@x.com".into()), parsed.headers.get_first_value("To"));
        assert_eq!(
            Some("Hello Sam".into()),
            parsed.headers.get_first_value("Subject")
        );
        assert!(parsed.headers.get_first_value("Message-ID").is_some());
        assert_eq!(None, parsed.headers.get_first_value("In-Reply-To"));
        assert_eq!(None, parsed.headers.get_first_value("References"));
        assert_eq!("text/html", parsed.ctype.mimetype);
        assert_eq!("<b>Hi</b>", parsed.get_body().unwrap().trim_end());
    }

    #[test]
    fn build_reply_message() {
        let payload = build_message(
            "me@localhost.com",
            "a@x.com",
            "Following up",
            "<b>Hi</b>",
            Some(("thread-1", "<first@mail.x.com>")),
        )
        .unwrap();
        assert_eq!(Some("thread-1".into()), payload.thread_id);

        let parsed = mailparse::parse_mail(&payload.raw).unwrap();
        assert_eq!(
            Some("<first@mail.x.com>".into()),
            parsed.headers.get_first_value("In-Reply-To")
        );
        assert_eq!(
            Some("<first@mail.x.com>".into()),
            parsed.headers.get_first_value("References")
        );
    }

    #[test]
    fn build_message_with_invalid_recipient() {
        assert!(matches!(
            build_message("me@localhost.com", "a..b@@x.com", "", "", None),
            Err(Error::ParseToError(_, to)) if to == "a..b@@x.com"
        ));
    }

    #[test]
    fn build_backup() {
        let raw = build_backup_message(
            "me@localhost.com",
            b"Email,Status\na@x.com,Sent\n",
            "Updated_label_20220101_000000.csv",
            Local::now(),
        )
        .unwrap();

        let parsed = mailparse::parse_mail(&raw).unwrap();
        assert_eq!(
            Some("me@localhost.com".into()),
            parsed.headers.get_first_value("To")
        );
        assert!(parsed
            .headers
            .get_first_value("Subject")
            .unwrap()
            .starts_with("Mail Merge Backup CSV - "));
        assert_eq!(2, parsed.subparts.len());
        assert_eq!(
            Some("base64".into()),
            parsed.subparts[1]
                .headers
                .get_first_value("Content-Transfer-Encoding")
        );
        assert_eq!(
            b"Email,Status\na@x.com,Sent\n".to_vec(),
            parsed.subparts[1].get_body_raw().unwrap()
        );
    }
}
