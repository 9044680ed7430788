//! Run module.
//!
//! A run descriptor is the working set of one invocation. It is plain
//! data so that an interrupted run can be persisted and reloaded.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    markup_to_html,
    merge::pacing::DELAY_JITTER_FACTOR,
    template::{self, render_or_fallback, Rendered},
    MergeConfig, SendMode, Table,
};

/// Represents the working set of one mail merge invocation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub table: Table,
    /// Represents the indices of the rows still to process, in table
    /// order.
    pub pending: Vec<usize>,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub label: String,
    /// Represents the inter-message delay bound, in seconds.
    pub delay: u64,
    pub mode: SendMode,
    pub batch_cap: usize,
}

impl RunDescriptor {
    pub fn new(table: Table, config: &MergeConfig) -> Self {
        let pending = table.pending_rows();
        debug!("{} pending rows out of {}", pending.len(), table.len());

        Self {
            table,
            pending,
            from: config.from.to_owned(),
            subject: config.subject.to_owned(),
            body: config.body.to_owned(),
            label: config.label.to_owned(),
            delay: config.delay,
            mode: config.mode,
            batch_cap: config.batch_cap,
        }
    }

    /// Recomputes the pending set from the table statuses.
    pub fn refresh_pending(&mut self) {
        self.pending = self.table.pending_rows();
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    /// Estimates how long the pass will take when started at `now`.
    pub fn eta(&self, now: DateTime<Local>) -> Eta {
        let recipients = if self.mode.is_capped() {
            self.pending.len().min(self.batch_cap)
        } else {
            self.pending.len()
        };
        let duration = self.delay() * recipients as u32;
        let secs = duration.as_secs_f64();

        Eta {
            recipients,
            duration,
            start: now,
            earliest_end: now + chrono_secs(secs * (1.0 - DELAY_JITTER_FACTOR)),
            end: now + chrono_secs(secs),
            latest_end: now + chrono_secs(secs * (1.0 + DELAY_JITTER_FACTOR)),
        }
    }

    /// Renders the message of the given row the way the pass would.
    pub fn preview(&self, index: usize) -> Option<Preview> {
        let row = self.table.row(index)?;
        let subject = render_or_fallback(&self.subject, row);
        let body = render_or_fallback(&self.body, row);

        Some(Preview {
            subject,
            html: markup_to_html(&body.text),
            body_error: body.error,
        })
    }
}

fn chrono_secs(secs: f64) -> ChronoDuration {
    ChronoDuration::milliseconds((secs * 1000.0).round() as i64)
}

/// Represents the estimated duration of a pass.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Eta {
    /// Represents the amount of messages the pass will dispatch.
    pub recipients: usize,
    pub duration: Duration,
    pub start: DateTime<Local>,
    pub earliest_end: DateTime<Local>,
    pub end: DateTime<Local>,
    pub latest_end: DateTime<Local>,
}

/// Represents the rendered message of one row.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Preview {
    pub subject: Rendered,
    pub html: String,
    pub body_error: Option<template::Error>,
}
