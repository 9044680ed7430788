use chrono::Local;
use log::{debug, info, trace, warn};
use proc_lock::{lock, LockPath};
use std::{
    collections::hash_map::DefaultHasher,
    env,
    error::Error as StdError,
    hash::{Hash, Hasher},
    io,
    path::{Path, PathBuf},
    result,
};
use thiserror::Error;

use super::{jitter, HeaderPoll, RunDescriptor, RunSummary, Sleeper, ThreadSleeper, DELAY_JITTER_FACTOR};
use crate::{
    config::DEFAULT_DONE_MARKER_FILE,
    extract_address,
    mail::{self, build_message, get_or_create_label, payload, MailService, SentMessage},
    markup_to_html, recipient, recovery,
    template::render_or_fallback,
    DoneMarker, MergeConfig, Outcome, Row, SendMode,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot lock mail merge run {1}")]
    LockRunError(#[source] io::Error, String),

    #[error(transparent)]
    TableError(#[from] recipient::Error),
}

pub type Result<T> = result::Result<T, Error>;

/// Represents the failure of one dispatch attempt. It marks the row
/// as errored without stopping the pass.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    PayloadError(#[from] payload::Error),
    #[error(transparent)]
    ServiceError(#[from] mail::Error),
}

/// Drives passes over run descriptors against a mail service.
pub struct Dispatcher<'a, P: Sleeper = ThreadSleeper> {
    service: &'a mut dyn MailService,
    sleeper: P,
    header_poll: HeaderPoll,
    output_dir: PathBuf,
    done_marker: PathBuf,
    checkpoint: Option<PathBuf>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(service: &'a mut dyn MailService) -> Self {
        let config = MergeConfig::default();
        Self {
            service,
            sleeper: ThreadSleeper,
            header_poll: HeaderPoll::default(),
            output_dir: config.output_dir(),
            done_marker: env::temp_dir().join(DEFAULT_DONE_MARKER_FILE),
            checkpoint: None,
        }
    }

    /// Creates a dispatcher persisting its files where the given
    /// configuration says.
    pub fn from_config(service: &'a mut dyn MailService, config: &MergeConfig) -> Self {
        Self::new(service)
            .output_dir(config.output_dir())
            .done_marker(config.done_marker_path())
            .checkpoint(config.run_file_path())
    }
}

impl<'a, P: Sleeper> Dispatcher<'a, P> {
    pub fn sleeper<Q: Sleeper>(self, sleeper: Q) -> Dispatcher<'a, Q> {
        Dispatcher {
            service: self.service,
            sleeper,
            header_poll: self.header_poll,
            output_dir: self.output_dir,
            done_marker: self.done_marker,
            checkpoint: self.checkpoint,
        }
    }

    pub fn header_poll(mut self, header_poll: HeaderPoll) -> Self {
        self.header_poll = header_poll;
        self
    }

    pub fn output_dir<D: Into<PathBuf>>(mut self, dir: D) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn done_marker<M: Into<PathBuf>>(mut self, path: M) -> Self {
        self.done_marker = path.into();
        self
    }

    /// Persists the run descriptor after every row at the given path,
    /// so that an interrupted pass can be resumed.
    pub fn checkpoint<C: Into<PathBuf>>(mut self, path: C) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    /// Runs one pass over the pending rows of the given run.
    ///
    /// Per-row failures never abort the pass: they are recorded in the
    /// table and reported in the summary. Only the run lock and table
    /// updates can fail the whole pass.
    pub fn run(&mut self, run: &mut RunDescriptor) -> Result<RunSummary> {
        trace!(">> run mail merge");

        let lock_name = lock_name(&self.done_marker);
        let lock_path = LockPath::Tmp(lock_name.clone());
        let guard = lock(&lock_path).map_err(|err| Error::LockRunError(err, lock_name))?;

        run.refresh_pending();
        let mut summary = RunSummary::new(run.mode);

        // a checkpoint left on disk means a previous pass never finished
        let resumed = self.checkpoint.as_deref().map_or(false, Path::exists);

        if run.pending.is_empty() && !resumed {
            info!("no pending rows, nothing to dispatch");
            drop(guard);
            trace!("<< run mail merge");
            return Ok(summary);
        }

        if resumed {
            info!("resuming unfinished pass");
        }
        info!("dispatching {} pending rows in {:?} mode", run.pending.len(), run.mode);

        let label_id = if run.mode.is_draft() || run.pending.is_empty() {
            None
        } else {
            match get_or_create_label(&mut *self.service, &run.label) {
                Ok(id) => Some(id),
                Err(err) => {
                    let msg = format!("cannot resolve label {:?}: {}", run.label, chain(&err));
                    warn!("{}, labeling disabled", msg);
                    summary.warnings.push(msg);
                    None
                }
            }
        };

        let mut sent_ids = Vec::new();
        let mut dispatched = 0;

        for index in run.pending.clone() {
            if run.mode.is_capped() && summary.sent >= run.batch_cap {
                info!("batch cap of {} reached, stopping the pass", run.batch_cap);
                summary.capped = true;
                break;
            }

            let row = match run.table.row(index) {
                Some(row) => row.clone(),
                None => {
                    warn!("cannot find pending row {}, ignoring it", index);
                    continue;
                }
            };

            let addr = match extract_address(row.email()) {
                Some(addr) => addr,
                None => {
                    info!("row {}: no address in {:?}, skipping it", index, row.email());
                    run.table.record(index, &Outcome::Skipped)?;
                    summary.skipped.push(row.email().to_owned());
                    self.save_checkpoint(run, &mut summary);
                    continue;
                }
            };

            let (subject, html) = render_row(run, &row, &addr, &mut summary);
            let conversation = match run.mode {
                SendMode::Reply => row.conversation(),
                _ => None,
            };

            let outcome = match build_message(&run.from, &addr, &subject, &html, conversation) {
                Err(err) => Err(DispatchError::from(err)),
                Ok(payload) => {
                    if dispatched > 0 {
                        let wait = jitter(run.delay(), DELAY_JITTER_FACTOR);
                        debug!("waiting {:?} before next dispatch", wait);
                        self.sleeper.sleep(wait);
                    }
                    dispatched += 1;
                    self.dispatch(run.mode, &payload, &addr, &mut summary)
                }
            };

            match outcome {
                Ok((outcome, sent)) => {
                    info!("row {}: {} to {}", index, outcome.status(), addr);
                    match outcome {
                        Outcome::Draft => summary.drafted += 1,
                        _ => {
                            summary.sent += 1;
                            sent_ids.extend(sent.map(|sent| sent.id));
                        }
                    }
                    run.table.record(index, &outcome)?;
                }
                Err(err) => {
                    let msg = chain(&err);
                    warn!("row {}: cannot dispatch message to {}: {}", index, addr, msg);
                    run.table.record(index, &Outcome::Error)?;
                    summary.errors.push((addr, msg));
                }
            }

            self.save_checkpoint(run, &mut summary);
        }

        run.refresh_pending();

        if !run.mode.is_draft() {
            self.finish(run, label_id, &sent_ids, &mut summary);
        }

        if let Some(path) = &self.checkpoint {
            if let Err(err) = recovery::remove_run(path) {
                let msg = format!("cannot remove run checkpoint: {}", chain(&err));
                warn!("{}", msg);
                summary.warnings.push(msg);
            }
        }

        drop(guard);

        info!(
            "pass done: {} sent, {} drafted, {} skipped, {} errors",
            summary.sent,
            summary.drafted,
            summary.skipped.len(),
            summary.errors.len()
        );
        trace!("<< run mail merge");
        Ok(summary)
    }

    fn dispatch(
        &mut self,
        mode: SendMode,
        payload: &payload::Payload,
        addr: &str,
        summary: &mut RunSummary,
    ) -> result::Result<(Outcome, Option<SentMessage>), DispatchError> {
        if mode.is_draft() {
            let draft = self.service.create_draft(&payload.raw)?;
            debug!("draft {} created for {}", draft.id, addr);
            return Ok((Outcome::Draft, None));
        }

        let sent = self.service.send(&payload.raw, payload.thread_id.as_deref())?;
        debug!("message {} sent to {} in thread {}", sent.id, addr, sent.thread_id);

        let rfc_message_id = self
            .header_poll
            .poll(&mut *self.service, &mut self.sleeper, &sent.id, "Message-ID")
            .unwrap_or_else(|| {
                let msg = format!("Message-ID of message to {} unavailable, using {}", addr, sent.id);
                warn!("{}", msg);
                summary.warnings.push(msg);
                sent.id.clone()
            });

        let outcome = Outcome::Sent {
            thread_id: sent.thread_id.clone(),
            rfc_message_id,
        };
        Ok((outcome, Some(sent)))
    }

    /// Labels sent messages, writes the updated table, delivers its
    /// backup and writes the done marker. Failures only end up as
    /// warnings: rows already reflect what was sent.
    fn finish(
        &mut self,
        run: &RunDescriptor,
        label_id: Option<String>,
        sent_ids: &[String],
        summary: &mut RunSummary,
    ) {
        trace!(">> finish pass");

        if let Some(label_id) = label_id.filter(|_| !sent_ids.is_empty()) {
            match self.service.batch_add_label(sent_ids, &label_id) {
                Ok(()) => debug!("label {} applied to {} messages", label_id, sent_ids.len()),
                Err(err) => {
                    let msg = format!("cannot apply label {:?}: {}", run.label, chain(&err));
                    warn!("{}", msg);
                    summary.warnings.push(msg);
                }
            }
        }

        let now = Local::now();

        match recovery::write_artifact(&self.output_dir, &run.label, &run.table, now) {
            Ok(path) => summary.artifact = Some(path),
            Err(err) => {
                let msg = format!("cannot write updated table: {}", chain(&err));
                warn!("{}", msg);
                summary.warnings.push(msg);
            }
        }

        let filename = summary
            .artifact
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| recovery::artifact_file_name(&run.label, now));
        let backup = match run.table.to_csv_bytes() {
            Ok(csv) => self.service.send_self(&csv, &filename).map_err(|err| chain(&err)),
            Err(err) => Err(chain(&err)),
        };
        if let Err(err) = backup {
            let msg = format!("cannot deliver backup {}: {}", filename, err);
            warn!("{}", msg);
            summary.warnings.push(msg);
        }

        if let Some(path) = &summary.artifact {
            if let Err(err) = DoneMarker::new(path.clone()).write(&self.done_marker) {
                let msg = format!("cannot write done marker: {}", chain(&err));
                warn!("{}", msg);
                summary.warnings.push(msg);
            }
        }

        trace!("<< finish pass");
    }

    fn save_checkpoint(&self, run: &RunDescriptor, summary: &mut RunSummary) {
        if let Some(path) = &self.checkpoint {
            if let Err(err) = recovery::save_run(path, run) {
                let msg = format!("cannot save run checkpoint: {}", chain(&err));
                warn!("{}", msg);
                summary.warnings.push(msg);
            }
        }
    }
}

/// Renders subject and body of the given row, falling back to the
/// unrendered templates.
fn render_row(run: &RunDescriptor, row: &Row, addr: &str, summary: &mut RunSummary) -> (String, String) {
    let subject = render_or_fallback(&run.subject, row);
    let body = render_or_fallback(&run.body, row);

    for err in subject.error.iter().chain(body.error.iter()) {
        debug!("template of message to {} sent unrendered: {}", addr, err);
        summary.render_errors.push((addr.to_owned(), err.to_string()));
    }

    (subject.text, markup_to_html(&body.text))
}

/// Names the lock after the done marker, so that sessions sharing it
/// cannot dispatch concurrently.
fn lock_name(done_marker: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    done_marker.hash(&mut hasher);
    format!("mailmerge-{:x}.lock", hasher.finish())
}

/// Formats an error with all its sources.
fn chain(err: &dyn StdError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        msg.push_str(": ");
        msg.push_str(&err.to_string());
        source = err.source();
    }
    msg
}
