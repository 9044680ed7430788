//! Recovery module.
//!
//! On startup, the previous session is looked up before anything
//! else: a completed pass is offered for export and reset instead of
//! a new upload, which guards against sending the same table twice.

use log::{debug, info, trace, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
    result,
};
use thiserror::Error;

use super::DoneMarker;
use crate::{recipient, RunDescriptor};

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot create directory {1}")]
    CreateDirError(#[source] io::Error, PathBuf),
    #[error("cannot read file {1}")]
    ReadFileError(#[source] io::Error, PathBuf),
    #[error("cannot write file {1}")]
    WriteFileError(#[source] io::Error, PathBuf),
    #[error("cannot remove file {1}")]
    RemoveFileError(#[source] io::Error, PathBuf),
    #[error("cannot serialize done marker")]
    SerializeMarkerError(#[source] serde_json::Error),
    #[error("cannot parse done marker {1}")]
    ParseMarkerError(#[source] serde_json::Error, PathBuf),
    #[error("cannot serialize run")]
    SerializeRunError(#[source] serde_json::Error),
    #[error("cannot parse run {1}")]
    ParseRunError(#[source] serde_json::Error, PathBuf),

    #[error(transparent)]
    TableError(#[from] recipient::Error),
}

pub type Result<T> = result::Result<T, Error>;

/// Represents the state left by the previous session.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Nothing to recover: start from a new upload.
    Fresh,
    /// A pass completed and its updated table is still available.
    Completed(DoneMarker),
    /// A pass was interrupted and can be resumed.
    Interrupted(Box<RunDescriptor>),
}

impl Recovery {
    /// Inspects the done marker and the run checkpoint left by the
    /// previous session.
    pub fn check(marker_path: &Path, run_path: &Path) -> Self {
        trace!(">> check previous session");

        match DoneMarker::read(marker_path) {
            Ok(Some(marker)) if marker.file.is_file() => {
                info!("previous run completed at {}", marker.done_time);
                return Self::Completed(marker);
            }
            Ok(Some(marker)) => {
                warn!("done marker points to missing file {:?}, ignoring it", marker.file)
            }
            Ok(None) => debug!("no done marker at {:?}", marker_path),
            Err(err) => warn!("cannot read done marker, ignoring it: {}", err),
        }

        let recovery = match load_run(run_path) {
            Ok(Some(run)) => {
                info!("previous run interrupted with {} pending rows", run.pending.len());
                Self::Interrupted(Box::new(run))
            }
            Ok(None) => Self::Fresh,
            Err(err) => {
                warn!("cannot read run checkpoint, ignoring it: {}", err);
                Self::Fresh
            }
        };

        trace!("<< check previous session");
        recovery
    }
}

/// Forgets the previous session: removes the done marker and the run
/// checkpoint. The updated table itself is kept.
pub fn reset(marker_path: &Path, run_path: &Path) -> Result<()> {
    info!("resetting previous session");
    DoneMarker::remove(marker_path)?;
    remove_run(run_path)
}

/// Persists the given run so that it can be resumed after a restart.
pub fn save_run(path: &Path, run: &RunDescriptor) -> Result<()> {
    let json = serde_json::to_vec(run).map_err(Error::SerializeRunError)?;
    write_atomically(path, &json)
}

pub fn load_run(path: &Path) -> Result<Option<RunDescriptor>> {
    let json = match fs::read(path) {
        Ok(json) => json,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::ReadFileError(err, path.to_owned())),
    };
    let mut run: RunDescriptor =
        serde_json::from_slice(&json).map_err(|err| Error::ParseRunError(err, path.to_owned()))?;
    run.refresh_pending();
    Ok(Some(run))
}

pub fn remove_run(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::RemoveFileError(err, path.to_owned())),
    }
}

/// Writes to a sibling temporary file then renames it, so that
/// readers never see a partially written file.
pub(crate) fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|err| Error::CreateDirError(err, dir.to_owned()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content).map_err(|err| Error::WriteFileError(err, tmp.clone()))?;
    fs::rename(&tmp, path).map_err(|err| Error::WriteFileError(err, path.to_owned()))
}
