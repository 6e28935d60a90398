//! Attachment records and the outcome of saving them.

use std::path::PathBuf;

/// One attachment ready to be written: its final name and decoded payload.
///
/// Records are derived per MIME part and dropped once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord<'a> {
    /// Date-prefixed filename, e.g. `Mon-Jan-2_15:04:05_photo.JPG`.
    pub filename: String,
    /// Content-transfer-decoded bytes.
    pub payload: &'a [u8],
}

/// What happened to an attachment on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// The file did not exist and was written.
    Written,
    /// A file with the same name already exists; nothing was written.
    AlreadyExists,
    /// The part decoded to no bytes (or failed to decode) and was skipped.
    Empty,
}

/// Result of processing one attachment part.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttachmentOutcome {
    /// Date-prefixed filename.
    pub filename: String,
    /// Full path inside the output directory.
    pub path: PathBuf,
    /// Whether the file was written, already present, or skipped.
    pub status: SaveStatus,
    /// Bytes written (0 unless `status` is `Written`).
    pub size: u64,
}
