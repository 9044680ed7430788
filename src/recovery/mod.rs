//! Recovery module.
//!
//! This module contains what survives a session: the updated table
//! artifact, the done marker written after a completed pass and the
//! checkpoint of an in-progress run.

pub mod artifact;
pub mod marker;
pub mod recovery;

pub use self::artifact::{artifact_file_name, safe_label, write_artifact};
pub use self::marker::DoneMarker;
pub use self::recovery::{load_run, remove_run, reset, save_run, Error, Recovery, Result};
