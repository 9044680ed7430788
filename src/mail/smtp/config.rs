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

//! SMTP config module.
//!
//! This module contains the representation of the SMTP mail service
//! configuration.

use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};

use super::{Error, Result};
use crate::process;

/// Represents the SMTP mail service config.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SmtpConfig {
    /// Represents the SMTP server host.
    pub host: String,
    /// Represents the SMTP server port.
    pub port: u16,
    /// Enables SSL.
    pub ssl: Option<bool>,
    /// Enables StartTLS.
    pub starttls: Option<bool>,
    /// Trusts any certificate.
    pub insecure: Option<bool>,
    /// Represents the SMTP server login.
    pub login: String,
    /// Represents the SMTP password command.
    pub passwd_cmd: String,
    /// Represents the directory drafts are written to, since SMTP
    /// has no draft storage.
    pub drafts_dir: Option<PathBuf>,
}

impl SmtpConfig {
    /// Builds the SMTP credentials from the login and the first line
    /// of the password command output.
    pub fn credentials(&self) -> Result<SmtpCredentials> {
        let passwd = process::run(&self.passwd_cmd).map_err(Error::GetPasswdError)?;
        let passwd = passwd
            .lines()
            .next()
            .filter(|passwd| !passwd.is_empty())
            .ok_or(Error::GetPasswdEmptyError)?;
        Ok(SmtpCredentials::new(
            self.login.to_owned(),
            passwd.to_owned(),
        ))
    }

    pub fn ssl(&self) -> bool {
        self.ssl.unwrap_or(true)
    }

    pub fn starttls(&self) -> bool {
        self.starttls.unwrap_or_default()
    }

    pub fn insecure(&self) -> bool {
        self.insecure.unwrap_or_default()
    }

    pub fn drafts_dir(&self) -> PathBuf {
        self.drafts_dir
            .to_owned()
            .unwrap_or_else(|| env::temp_dir().join("mailmerge-drafts"))
    }
}
