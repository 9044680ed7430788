use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::SendMode;

/// Represents what happened during one pass.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: SendMode,
    /// Represents the amount of messages sent.
    pub sent: usize,
    /// Represents the amount of drafts created.
    pub drafted: usize,
    /// Represents the raw email values of skipped rows.
    pub skipped: Vec<String>,
    /// Represents the `(address, message)` pairs of failed rows.
    pub errors: Vec<(String, String)>,
    /// Represents the `(address, message)` pairs of rows sent with an
    /// unrendered template.
    pub render_errors: Vec<(String, String)>,
    /// Represents non-fatal failures of labeling, header lookups and
    /// persistence.
    pub warnings: Vec<String>,
    /// Tells if the batch cap stopped the pass early.
    pub capped: bool,
    /// Represents the updated table written at the end of the pass.
    pub artifact: Option<PathBuf>,
}

impl RunSummary {
    pub fn new(mode: SendMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Gets the amount of rows that reached a terminal state during
    /// the pass.
    pub fn processed(&self) -> usize {
        self.sent + self.drafted + self.skipped.len() + self.errors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.render_errors.is_empty() && self.warnings.is_empty()
    }
}
