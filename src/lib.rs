pub(crate) mod process;

pub mod config;
pub use config::{MergeConfig, SendMode};

pub mod template;
pub use template::{markup_to_html, render, render_or_fallback, Fields, Rendered};

pub mod recipient;
pub use recipient::{extract_address, pending_rows, Outcome, Row, Status, Table};

pub mod mail;
pub use mail::{
    build_backup_message, build_message, get_or_create_label, Label, MailService,
    MemoryMailService, Payload, SentMessage, StoredMessage,
};
#[cfg(feature = "smtp-service")]
pub use mail::{SmtpConfig, SmtpMailService};

pub mod merge;
pub use merge::{
    DispatchError, Dispatcher, Eta, HeaderPoll, Preview, RecordingSleeper, RunDescriptor,
    RunSummary, Sleeper, ThreadSleeper,
};

pub mod recovery;
pub use recovery::{DoneMarker, Recovery};
