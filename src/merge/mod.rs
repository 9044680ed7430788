//! Merge module.
//!
//! This module contains the dispatch engine: one paced pass over the
//! pending rows of a run, sending (or drafting) one personalized
//! message per row and recording each outcome in the table.

pub mod merge;
pub mod pacing;
pub mod run;
pub mod summary;

pub use self::merge::{DispatchError, Dispatcher, Error, Result};
pub use self::pacing::{jitter, HeaderPoll, RecordingSleeper, Sleeper, ThreadSleeper, DELAY_JITTER_FACTOR};
pub use self::run::{Eta, Preview, RunDescriptor};
pub use self::summary::RunSummary;
