//! Connection lifecycle: connect → login (and select All Mail) → search/fetch → close.
//!
//! The states are separate types: [`ImapConnection`] is consumed by
//! [`ImapConnection::login`], which yields a [`MailSession`] with All Mail
//! selected, and [`MailSession::close`] consumes the session.

use std::io::{Read, Write};
use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info};

use crate::error::{LostPhotosError, Result};
use crate::imap::folders::resolve_all_mail;
use crate::imap::{ATTACHMENT_QUERY, IMAPS_PORT};
use crate::model::message::MessageMatch;
use crate::pipeline::MessageSource;

/// A connected but not yet authenticated IMAP client.
pub struct ImapConnection<T: Read + Write> {
    host: String,
    client: imap::Client<T>,
}

impl ImapConnection<TlsStream<TcpStream>> {
    /// Open a TLS connection to `host` on the IMAPS port and read the greeting.
    pub fn connect(host: &str) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(LostPhotosError::Connection {
                host: host.to_string(),
                reason: "missing IMAP host parameter in your config".into(),
            });
        }

        let connection_error = |reason: String| LostPhotosError::Connection {
            host: host.to_string(),
            reason,
        };

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| connection_error(e.to_string()))?;
        let client = imap::connect((host, IMAPS_PORT), host, &tls)
            .map_err(|e| connection_error(e.to_string()))?;
        info!(host, port = IMAPS_PORT, "Connected");

        Ok(Self {
            host: host.to_string(),
            client,
        })
    }
}

impl<T: Read + Write> ImapConnection<T> {
    /// Wrap an already-open stream (a tunnel, or a scripted server in tests)
    /// and read the server greeting from it.
    pub fn from_stream(host: &str, stream: T) -> Result<Self> {
        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| LostPhotosError::Connection {
                host: host.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            host: host.to_string(),
            client,
        })
    }

    /// Authenticate and select the All Mail folder.
    pub fn login(self, username: &str, password: &str) -> Result<MailSession<T>> {
        if username.is_empty() || password.is_empty() {
            return Err(LostPhotosError::MissingCredentials);
        }

        let mut session = self
            .client
            .login(username, password)
            .map_err(|(source, _client)| LostPhotosError::Auth {
                username: username.to_string(),
                source,
            })?;
        info!(host = %self.host, username, "Logged in");

        let folder = resolve_all_mail(&mut session)?;
        session
            .select(&folder)
            .map_err(|e| LostPhotosError::Folder(format!("cannot select '{folder}': {e}")))?;
        info!(folder = %folder, "Selected folder");

        Ok(MailSession { session, folder })
    }
}

/// An authenticated session with the All Mail folder selected.
pub struct MailSession<T: Read + Write> {
    session: imap::Session<T>,
    folder: String,
}

impl<T: Read + Write> MailSession<T> {
    /// Name of the selected folder.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Run the Gmail attachment search; UIDs are returned in ascending order.
    pub fn search(&mut self) -> Result<Vec<MessageMatch>> {
        let uids = self
            .session
            .uid_search(ATTACHMENT_QUERY)
            .map_err(|source| LostPhotosError::Search { source })?;

        let mut uids: Vec<MessageMatch> = uids.into_iter().collect();
        uids.sort_unstable();
        info!(
            count = uids.len(),
            criteria = ATTACHMENT_QUERY,
            "Messages matched the search criteria"
        );
        Ok(uids)
    }

    /// Fetch the full RFC 822 text of one message.
    ///
    /// A response without a body yields an empty vector.
    pub fn fetch(&mut self, uid: MessageMatch) -> Result<Vec<u8>> {
        let fetches = self
            .session
            .uid_fetch(uid.to_string(), "RFC822")
            .map_err(|source| LostPhotosError::Fetch { uid, source })?;

        let body = fetches
            .iter()
            .find_map(|fetch| fetch.body())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        debug!(uid, size = body.len(), "Fetched message");
        Ok(body)
    }

    /// Unselect the folder and log out.
    pub fn close(mut self) -> Result<()> {
        self.session
            .close()
            .map_err(|e| LostPhotosError::imap("CLOSE", e))?;
        self.session
            .logout()
            .map_err(|e| LostPhotosError::imap("LOGOUT", e))?;
        info!("Logged out");
        Ok(())
    }
}

impl<T: Read + Write> MessageSource for MailSession<T> {
    fn search(&mut self) -> Result<Vec<MessageMatch>> {
        MailSession::search(self)
    }

    fn fetch(&mut self, uid: MessageMatch) -> Result<Vec<u8>> {
        MailSession::fetch(self, uid)
    }
}
