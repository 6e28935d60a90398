//! Locating Gmail's "All Mail" folder.

use std::io::{Read, Write};

use imap::types::{Name, NameAttribute};
use imap::Session;
use tracing::{debug, info};

use crate::error::{LostPhotosError, Result};

/// Where Gmail keeps All Mail for English-language accounts.
pub const GMAIL_ALL_MAIL: &str = "[Gmail]/All Mail";

/// Find the name of the All Mail folder.
///
/// `[Gmail]/All Mail` is tried first. Localised accounts name it differently
/// (`[Gmail]/Todos`, `[Google Mail]/Alle Nachrichten`, …), so the full folder
/// list is then searched for the `\AllMail` (XLIST) or `\All` (RFC 6154)
/// attribute.
pub fn resolve_all_mail<T: Read + Write>(session: &mut Session<T>) -> Result<String> {
    let exact = session
        .list(Some(""), Some(&format!("\"{GMAIL_ALL_MAIL}\"")))
        .map_err(|e| LostPhotosError::imap("LIST", e))?;
    if exact.iter().any(|name| name.name() == GMAIL_ALL_MAIL) {
        return Ok(GMAIL_ALL_MAIL.to_string());
    }
    debug!("{GMAIL_ALL_MAIL} not found, searching folder attributes");

    let folders = session
        .list(Some(""), Some("*"))
        .map_err(|e| LostPhotosError::imap("LIST", e))?;
    let found = find_all_mail(folders.iter())
        .ok_or_else(|| LostPhotosError::Folder("no folder is marked \\All or \\AllMail".into()))?;
    info!(folder = %found, "Found All Mail folder by attribute");
    Ok(found)
}

/// First folder carrying an All Mail attribute.
pub fn find_all_mail<'a>(folders: impl IntoIterator<Item = &'a Name>) -> Option<String> {
    folders
        .into_iter()
        .find(|folder| folder.attributes().iter().any(is_all_mail))
        .map(|folder| folder.name().to_string())
}

fn is_all_mail(attribute: &NameAttribute<'_>) -> bool {
    match attribute {
        NameAttribute::Custom(label) => is_all_mail_label(label),
        _ => false,
    }
}

/// `\All`, `\AllMail` (any case, backslash optional).
pub fn is_all_mail_label(label: &str) -> bool {
    let label = label.trim_start_matches('\\');
    label.eq_ignore_ascii_case("All") || label.eq_ignore_ascii_case("AllMail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_mail_labels() {
        assert!(is_all_mail_label("\\All"));
        assert!(is_all_mail_label("\\AllMail"));
        assert!(is_all_mail_label("allmail"));
        assert!(!is_all_mail_label("\\Sent"));
        assert!(!is_all_mail_label("\\HasNoChildren"));
        assert!(!is_all_mail_label("\\Allow"));
    }
}
