// mailmerge-lib, a Rust library for paced, resumable mail merge runs.
// Copyright (C) 2022  soywod <clement.douin@posteo.net>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Config module.
//!
//! This module contains the representation of the operator-facing
//! configuration of a mail merge run.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    result,
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_SUBJECT: &str = "Hello {Name}";
pub const DEFAULT_BODY: &str = "Dear {Name},

Welcome to **Mail Merge App** demo.

Thanks,  
**Your Company**";
pub const DEFAULT_LABEL: &str = "Mail Merge Sent";

pub const MIN_DELAY: u64 = 20;
pub const MAX_DELAY: u64 = 75;
pub const DEFAULT_DELAY: u64 = MIN_DELAY;
pub const DEFAULT_BATCH_CAP: usize = 50;

pub const DEFAULT_DONE_MARKER_FILE: &str = "mailmerge_done.json";
pub const DEFAULT_RUN_FILE: &str = "mailmerge_run.json";

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read config file {1}")]
    ReadConfigFileError(#[source] std::io::Error, PathBuf),
    #[error("cannot parse config")]
    ParseConfigError(#[source] toml::de::Error),
    #[error("delay of {0}s is out of range (expected {}..={})", MIN_DELAY, MAX_DELAY)]
    DelayOutOfRangeError(u64),
    #[error("cannot find sender address: `from` is empty")]
    MissingFromError,
    #[error("batch cap must be at least 1")]
    EmptyBatchCapError,
}

pub type Result<T> = result::Result<T, Error>;

/// Represents the way messages are dispatched.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendMode {
    /// Sends a new, unthreaded message.
    #[default]
    NewMessage,
    /// Replies into the conversation referenced by the row, when the
    /// row carries one.
    Reply,
    /// Stores the message as a draft instead of sending it.
    Draft,
}

impl SendMode {
    pub fn is_draft(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Only modes that actually transmit messages are subject to the
    /// per-run batch cap.
    pub fn is_capped(&self) -> bool {
        !self.is_draft()
    }
}

/// Represents the mail merge configuration.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MergeConfig {
    /// Represents the operator address, used as sender and as
    /// recipient of the backup message.
    pub from: String,
    /// Represents the subject template.
    pub subject: String,
    /// Represents the body template (markup + placeholders).
    pub body: String,
    /// Represents the label applied to sent messages.
    pub label: String,
    /// Represents the inter-message delay bound, in seconds.
    pub delay: u64,
    /// Represents the send mode.
    pub mode: SendMode,
    /// Represents the maximum amount of messages sent per run.
    pub batch_cap: usize,
    /// Represents the directory the updated table is written to.
    pub output_dir: Option<PathBuf>,
    /// Represents the path of the done marker.
    pub done_marker: Option<PathBuf>,
    /// Represents the path of the persisted run descriptor.
    pub run_file: Option<PathBuf>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            from: String::new(),
            subject: DEFAULT_SUBJECT.to_owned(),
            body: DEFAULT_BODY.to_owned(),
            label: DEFAULT_LABEL.to_owned(),
            delay: DEFAULT_DELAY,
            mode: SendMode::default(),
            batch_cap: DEFAULT_BATCH_CAP,
            output_dir: None,
            done_marker: None,
            run_file: None,
        }
    }
}

impl MergeConfig {
    /// Parses and validates a TOML configuration.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml).map_err(Error::ParseConfigError)?;
        config.validate()?;
        debug!("merge config: {:?}", config);
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|err| Error::ReadConfigFileError(err, path.to_owned()))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_DELAY..=MAX_DELAY).contains(&self.delay) {
            return Err(Error::DelayOutOfRangeError(self.delay));
        }

        if self.from.trim().is_empty() {
            return Err(Error::MissingFromError);
        }

        if self.batch_cap == 0 {
            return Err(Error::EmptyBatchCapError);
        }

        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    /// Gets the output directory. Falls back to the user local data
    /// directory, then to the temporary directory.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .as_deref()
            .and_then(expand_path)
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("mailmerge")))
            .unwrap_or_else(env::temp_dir)
    }

    pub fn done_marker_path(&self) -> PathBuf {
        self.done_marker
            .as_deref()
            .and_then(expand_path)
            .unwrap_or_else(|| env::temp_dir().join(DEFAULT_DONE_MARKER_FILE))
    }

    pub fn run_file_path(&self) -> PathBuf {
        self.run_file
            .as_deref()
            .and_then(expand_path)
            .unwrap_or_else(|| env::temp_dir().join(DEFAULT_RUN_FILE))
    }
}

fn expand_path(path: &Path) -> Option<PathBuf> {
    let raw = path.to_str()?;
    match shellexpand::full(raw) {
        Ok(expanded) => Some(PathBuf::from(expanded.to_string())),
        Err(err) => {
            warn!("cannot expand path {:?}, using it as is: {}", raw, err);
            Some(path.to_owned())
        }
    }
}
