//! Extract attachments from fetched messages and save them to disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use tracing::{debug, warn};

use crate::error::{LostPhotosError, Result};
use crate::model::attachment::{AttachmentOutcome, AttachmentRecord, SaveStatus};
use crate::model::message::MessageReport;
use crate::parser::header::{self, HeaderDate};
use crate::parser::mime;

/// Saves every attachment of the messages it is given into one directory.
///
/// Files are named `<date prefix><filename>`. Parts without a filename get
/// `attachment-NNNNNN.bin` from a counter that runs across every message
/// handled by this extractor and is never reset.
#[derive(Debug)]
pub struct AttachmentExtractor {
    output_dir: PathBuf,
    seq: u32,
}

impl AttachmentExtractor {
    /// Create an extractor writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            seq: 0,
        }
    }

    /// Create an extractor writing into `<root>/<username>`.
    pub fn for_account(root: &Path, username: &str) -> Self {
        Self::new(root.join(sanitize_filename(username)))
    }

    /// Directory attachments are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of attachment parts processed so far.
    pub fn sequence(&self) -> u32 {
        self.seq
    }

    /// Process one raw RFC 822 message.
    ///
    /// Returns `None` when the message is not `multipart/*` and so cannot
    /// carry attachments.
    pub fn extract(&mut self, raw_message: &[u8]) -> Result<Option<MessageReport>> {
        let message = mime::parse_message(raw_message)?;
        if !message.is_multipart() {
            debug!("Message is not multipart, skipping");
            return Ok(None);
        }

        let from = message.from();
        let subject = message.subject();
        let date = message.date().unwrap_or_else(|| {
            warn!(subject = %subject, "Message has no usable Date header, using the epoch");
            fallback_date()
        });
        let date_prefix = header::date_prefix(&date);

        let mut attachments = Vec::new();
        for part in message.disposition_parts() {
            let name = self.next_filename(part.filename.as_deref());
            let payload: &[u8] = if part.decode_failed { &[] } else { part.payload };
            debug!(
                filename = %name,
                content_type = %part.content_type,
                size = payload.len(),
                "Attachment part"
            );
            let record = AttachmentRecord {
                filename: format!("{date_prefix}{name}"),
                payload,
            };
            attachments.push(self.save(&record)?);
        }

        Ok(Some(MessageReport {
            from,
            subject,
            date_prefix,
            attachments,
        }))
    }

    /// Pick the name for the next attachment part and advance the counter.
    pub fn next_filename(&mut self, decoded: Option<&str>) -> String {
        let name = match decoded {
            Some(name) => sanitize_filename(name),
            None => format!("attachment-{:06}.bin", self.seq),
        };
        self.seq += 1;
        name
    }

    /// Write `record` unless a file with the same name already exists.
    pub fn save(&self, record: &AttachmentRecord<'_>) -> Result<AttachmentOutcome> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join(&record.filename);

        let outcome = |status, size| AttachmentOutcome {
            filename: record.filename.clone(),
            path: path.clone(),
            status,
            size,
        };

        if record.payload.is_empty() {
            if path.exists() {
                return Ok(outcome(SaveStatus::AlreadyExists, 0));
            }
            warn!(filename = %record.filename, "Attachment payload is empty, not writing");
            return Ok(outcome(SaveStatus::Empty, 0));
        }

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "Already downloaded");
                return Ok(outcome(SaveStatus::AlreadyExists, 0));
            }
            Err(e) => return Err(LostPhotosError::io(&path, e)),
        };
        file.write_all(record.payload)
            .map_err(|e| LostPhotosError::io(&path, e))?;

        Ok(outcome(SaveStatus::Written, record.payload.len() as u64))
    }

    fn ensure_output_dir(&self) -> Result<()> {
        if !self.output_dir.is_dir() {
            std::fs::create_dir_all(&self.output_dir)
                .map_err(|e| LostPhotosError::io(&self.output_dir, e))?;
        }
        Ok(())
    }
}

/// Date prefix used when a message carries no parseable `Date` header.
pub fn fallback_date() -> HeaderDate {
    HeaderDate::from(DateTime::UNIX_EPOCH.naive_utc())
}

/// Make a decoded name safe to use as a single path component.
///
/// Only path separators and NUL are replaced; everything else is kept so the
/// saved file carries the sender's original name.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_names_count_every_part() {
        let tmp = tempfile::tempdir().unwrap();
        let mut extractor = AttachmentExtractor::new(tmp.path());
        assert_eq!(extractor.next_filename(None), "attachment-000000.bin");
        assert_eq!(extractor.next_filename(Some("a.jpg")), "a.jpg");
        assert_eq!(extractor.next_filename(None), "attachment-000002.bin");
        assert_eq!(extractor.sequence(), 3);
    }

    #[test]
    fn test_save_writes_once() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = AttachmentExtractor::new(tmp.path().join("user@gmail.com"));
        let record = AttachmentRecord {
            filename: "Mon-Jan-2_15:04:05_photo.JPG".to_string(),
            payload: b"\xff\xd8\xff",
        };

        let first = extractor.save(&record).unwrap();
        assert_eq!(first.status, SaveStatus::Written);
        assert_eq!(first.size, 3);
        assert_eq!(std::fs::read(&first.path).unwrap(), b"\xff\xd8\xff");

        let changed = AttachmentRecord {
            payload: b"other",
            ..record.clone()
        };
        let second = extractor.save(&changed).unwrap();
        assert_eq!(second.status, SaveStatus::AlreadyExists);
        assert_eq!(std::fs::read(&second.path).unwrap(), b"\xff\xd8\xff");
    }

    #[test]
    fn test_empty_payload_is_not_written() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = AttachmentExtractor::new(tmp.path());
        let record = AttachmentRecord {
            filename: "empty.png".to_string(),
            payload: b"",
        };
        let outcome = extractor.save(&record).unwrap();
        assert_eq!(outcome.status, SaveStatus::Empty);
        assert!(!outcome.path.exists());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("photo.JPG"), "photo.JPG");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("a\\b"), "a_b");
        assert_eq!(sanitize_filename(".."), "_");
        assert_eq!(sanitize_filename("vacation 2006.png"), "vacation 2006.png");
    }

    #[test]
    fn test_for_account_uses_username_dir() {
        let extractor = AttachmentExtractor::for_account(Path::new("out"), "me@gmail.com");
        assert_eq!(extractor.output_dir(), Path::new("out/me@gmail.com"));
    }

    #[test]
    fn test_fallback_date_prefix() {
        assert_eq!(header::date_prefix(&fallback_date()), "Thu-Jan-1_00:00:00_");
    }
}
