//! Process module.
//!
//! This module contains cross platform helpers around the
//! `std::process` crate, used to retrieve secrets from shell
//! commands.

use log::debug;
use std::{io, process::Command, result, string};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot run command {1:?}")]
    RunCmdError(#[source] io::Error, String),
    #[error("command {1:?} exited with status {0}")]
    ExitStatusError(i32, String),
    #[error("cannot parse command output")]
    ParseCmdOutputError(#[source] string::FromUtf8Error),
}

pub type Result<T> = result::Result<T, Error>;

/// Runs the given command through the system shell and returns its
/// standard output as UTF-8 string.
pub fn run(cmd: &str) -> Result<String> {
    debug!("running command: {}", cmd);

    let output = if cfg!(target_os = "windows") {
        Command::new("cmd").args(&["/C", cmd]).output()
    } else {
        Command::new("sh").arg("-c").arg(cmd).output()
    }
    .map_err(|err| Error::RunCmdError(err, cmd.to_owned()))?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(Error::ExitStatusError(code, cmd.to_owned()));
    }

    String::from_utf8(output.stdout).map_err(Error::ParseCmdOutputError)
}
