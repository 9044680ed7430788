pub mod config;
pub use config::SmtpConfig;

pub mod smtp;
pub use smtp::{Error, Result, SmtpMailService};
