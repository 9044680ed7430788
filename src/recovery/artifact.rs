use chrono::{DateTime, Local};
use log::{info, trace};
use regex::Regex;
use std::{fs, path::{Path, PathBuf}, sync::OnceLock};

use super::{Error, Result};
use crate::Table;

fn unsafe_chars_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap())
}

/// Replaces every character that is not safe in a file name by `_`.
pub fn safe_label(label: &str) -> String {
    unsafe_chars_regex().replace_all(label, "_").into_owned()
}

pub fn artifact_file_name(label: &str, date: DateTime<Local>) -> String {
    format!(
        "Updated_{}_{}.csv",
        safe_label(label),
        date.format("%Y%m%d_%H%M%S")
    )
}

/// Gets a path for the artifact that does not exist yet in the given
/// directory. Artifacts of the same second get a `_1`, `_2`… suffix.
fn free_artifact_path(dir: &Path, label: &str, date: DateTime<Local>) -> PathBuf {
    let name = artifact_file_name(label, date);
    let mut path = dir.join(&name);
    let stem = name.trim_end_matches(".csv");
    let mut count = 0;
    while path.exists() {
        count += 1;
        path = dir.join(format!("{}_{}.csv", stem, count));
    }
    path
}

/// Writes the given table as delimited text in the given directory.
/// An existing artifact is never overwritten.
pub fn write_artifact(dir: &Path, label: &str, table: &Table, date: DateTime<Local>) -> Result<PathBuf> {
    trace!(">> write artifact");

    fs::create_dir_all(dir).map_err(|err| Error::CreateDirError(err, dir.to_owned()))?;
    let path = free_artifact_path(dir, label, date);
    table.write_csv_path(&path)?;
    info!("updated table written at {:?}", path);

    trace!("<< write artifact");
    Ok(path)
}
