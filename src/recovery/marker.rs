use chrono::{DateTime, Local};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use super::{Error, Result};

/// Represents the record of the last completed pass.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DoneMarker {
    pub done_time: DateTime<Local>,
    /// Represents the path of the updated table.
    pub file: PathBuf,
}

impl DoneMarker {
    pub fn new(file: PathBuf) -> Self {
        Self {
            done_time: Local::now(),
            file,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        trace!(">> write done marker at {:?}", path);
        let json = serde_json::to_vec(self).map_err(Error::SerializeMarkerError)?;
        super::recovery::write_atomically(path, &json)?;
        trace!("<< write done marker");
        Ok(())
    }

    /// Reads the done marker at the given path, if any.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let json = match fs::read(path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::ReadFileError(err, path.to_owned())),
        };
        let marker = serde_json::from_slice(&json)
            .map_err(|err| Error::ParseMarkerError(err, path.to_owned()))?;
        debug!("done marker: {:?}", marker);
        Ok(Some(marker))
    }

    /// Removes the done marker at the given path. A missing marker is
    /// not an error.
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::RemoveFileError(err, path.to_owned())),
        }
    }
}
