//! Matched messages and per-message extraction reports.

use super::attachment::AttachmentOutcome;

/// Server-assigned UID returned by the attachment search.
pub type MessageMatch = u32;

/// What the extractor did with one multipart message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MessageReport {
    /// Decoded `From` header (empty when missing).
    pub from: String,

    /// Decoded `Subject` header (empty when missing).
    pub subject: String,

    /// Filename prefix derived from the `Date` header, e.g. `Mon-Jan-2_15:04:05_`.
    pub date_prefix: String,

    /// One entry per part carrying a `Content-Disposition`, in walk order.
    pub attachments: Vec<AttachmentOutcome>,
}
