//! Search, then fetch and extract every match, one message at a time.

use serde::Serialize;
use tracing::warn;

use crate::error::{LostPhotosError, Result};
use crate::export::attachment::AttachmentExtractor;
use crate::model::attachment::{AttachmentOutcome, SaveStatus};
use crate::model::message::{MessageMatch, MessageReport};

/// Anything that can run the attachment search and hand back raw messages.
pub trait MessageSource {
    /// Identifiers of every message matching the attachment search.
    fn search(&mut self) -> Result<Vec<MessageMatch>>;

    /// Full RFC 822 bytes of one matched message.
    fn fetch(&mut self, uid: MessageMatch) -> Result<Vec<u8>>;
}

/// Progress notifications emitted while the pipeline runs.
#[derive(Debug)]
pub enum Event<'a> {
    /// The search finished with `count` matches.
    Matched { count: usize },
    /// Message `current` of `total` is about to be fetched.
    Fetching { current: usize, total: usize },
    /// A multipart message was processed.
    Message(&'a MessageReport),
    /// One attachment part of the last reported message.
    Attachment(&'a AttachmentOutcome),
    /// A message was left out (empty fetch or unparseable MIME).
    Skipped { uid: MessageMatch, reason: String },
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Messages returned by the search.
    pub matched: usize,
    /// Multipart messages whose parts were walked.
    pub processed: usize,
    /// Messages that were not multipart.
    pub not_multipart: usize,
    /// Messages skipped because they were empty or could not be parsed.
    pub skipped: usize,
    /// Attachment files written.
    pub written: usize,
    /// Attachments whose file already existed.
    pub already_present: usize,
    /// Attachments with an empty payload.
    pub empty: usize,
    /// Total bytes written.
    pub bytes_written: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &AttachmentOutcome) {
        match outcome.status {
            SaveStatus::Written => {
                self.written += 1;
                self.bytes_written += outcome.size;
            }
            SaveStatus::AlreadyExists => self.already_present += 1,
            SaveStatus::Empty => self.empty += 1,
        }
    }
}

/// Search `source` and save the attachments of every match.
///
/// A message that cannot be parsed is skipped; fetch and filesystem errors
/// stop the run.
pub fn run<S>(
    source: &mut S,
    extractor: &mut AttachmentExtractor,
    mut on_event: impl FnMut(Event<'_>),
) -> Result<RunSummary>
where
    S: MessageSource + ?Sized,
{
    let matches = source.search()?;
    let total = matches.len();
    let mut summary = RunSummary {
        matched: total,
        ..RunSummary::default()
    };
    on_event(Event::Matched { count: total });

    for (i, uid) in matches.into_iter().enumerate() {
        on_event(Event::Fetching {
            current: i,
            total,
        });

        let raw = source.fetch(uid)?;
        if raw.is_empty() {
            summary.skipped += 1;
            on_event(Event::Skipped {
                uid,
                reason: "server returned no message body".into(),
            });
            continue;
        }

        let report = match extractor.extract(&raw) {
            Ok(Some(report)) => report,
            Ok(None) => {
                summary.not_multipart += 1;
                continue;
            }
            Err(LostPhotosError::Mime(reason)) => {
                warn!(uid, %reason, "Skipping message");
                summary.skipped += 1;
                on_event(Event::Skipped { uid, reason });
                continue;
            }
            Err(e) => return Err(e),
        };

        summary.processed += 1;
        on_event(Event::Message(&report));
        for outcome in &report.attachments {
            summary.record(outcome);
            on_event(Event::Attachment(outcome));
        }
    }

    on_event(Event::Fetching {
        current: total,
        total,
    });
    Ok(summary)
}
