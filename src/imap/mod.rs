//! IMAP access to a Gmail account: connection, login, All Mail discovery,
//! attachment search and message fetch.

pub mod folders;
pub mod session;

pub use session::{ImapConnection, MailSession};

/// Port for IMAP over implicit TLS.
pub const IMAPS_PORT: u16 = 993;

/// Gmail raw search for messages with an image attachment.
///
/// Only Gmail understands `X-GM-RAW`; other servers reject it.
pub const ATTACHMENT_QUERY: &str = "X-GM-RAW \"has:attachment filename:(jpg OR jpeg OR gif OR png OR tiff OR tif OR ico OR xbm OR bmp)\"";
