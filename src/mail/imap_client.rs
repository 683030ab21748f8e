use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use log::{debug, warn};
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;

use crate::auth::token_manager::TokenManager;
use crate::domain::email::{EmailId, EmailRecord};
use crate::mail::decoders::{body_text, decode_subject, format_sender};
use crate::mail::{DateRange, MailConnector, MailService};

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// `user=<u>^Aauth=Bearer <t>^A^A`
fn xoauth2_payload(user: &str, access_token: &str) -> Vec<u8> {
    format!("user={user}\x01auth=Bearer {access_token}\x01\x01").into_bytes()
}

struct OAuth2Authenticator {
    response: Vec<u8>,
}

impl imap::Authenticator for OAuth2Authenticator {
    type Response = Vec<u8>;
    fn process(&self, _challenge: &[u8]) -> Self::Response {
        self.response.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ImapClient {
    pub server: String,
    pub user: String,
    pub mailbox: String,
}

impl ImapClient {
    pub fn new(server: impl Into<String>, user: impl Into<String>, mailbox: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            mailbox: mailbox.into(),
        }
    }

    fn connect_and_auth(&self, access_token: &str) -> Result<ImapSession> {
        let tls = TlsConnector::builder().build()?;
        let mut client = imap::connect((self.server.as_str(), 993), self.server.as_str(), &tls)?;

        let payload = xoauth2_payload(&self.user, access_token);

        // some servers want the payload raw, some base64 encoded
        let raw = OAuth2Authenticator {
            response: payload.clone(),
        };
        match client.authenticate("XOAUTH2", &raw) {
            Ok(session) => return Ok(session),
            Err((_e, returned)) => client = returned,
        }

        let encoded = OAuth2Authenticator {
            response: general_purpose::STANDARD.encode(&payload).into_bytes(),
        };
        match client.authenticate("XOAUTH2", &encoded) {
            Ok(session) => Ok(session),
            Err((e, _)) => Err(anyhow!("XOAUTH2 failed (raw+base64): {e}")),
        }
    }

    fn open(&self, access_token: &str) -> Result<ImapSession> {
        let mut session = self.connect_and_auth(access_token)?;
        session.select(&self.mailbox)?;
        Ok(session)
    }
}

/// Fetches a fresh access token on every connect.
pub struct ImapConnector {
    client: ImapClient,
    tokens: TokenManager,
}

impl ImapConnector {
    pub fn new(client: ImapClient, tokens: TokenManager) -> Self {
        Self { client, tokens }
    }
}

impl MailConnector for ImapConnector {
    fn connect(&self) -> Result<Box<dyn MailService>> {
        let access_token = self.tokens.get_access_token()?;
        let session = self.client.open(&access_token)?;
        debug!("IMAP session open on {} as {}", self.client.server, self.client.user);
        Ok(Box::new(ImapMailService {
            client: self.client.clone(),
            access_token,
            session: Some(session),
        }))
    }
}

/// Keeps one IMAP session and reopens it after a failure.
pub struct ImapMailService {
    client: ImapClient,
    access_token: String,
    session: Option<ImapSession>,
}

impl ImapMailService {
    fn with_session<T>(&mut self, op: impl FnOnce(&mut ImapSession) -> Result<T>) -> Result<T> {
        if self.session.is_none() {
            self.session = Some(self.client.open(&self.access_token)?);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(anyhow!("IMAP session unavailable"));
        };
        let out = op(session);
        if out.is_err() {
            // drop a possibly broken connection; the next call reconnects
            self.session = None;
        }
        out
    }
}

impl MailService for ImapMailService {
    fn search(&mut self, range: &DateRange) -> Result<Vec<EmailId>> {
        let query = range.imap_query();
        self.with_session(|s| {
            let mut uids: Vec<EmailId> = s.uid_search(&query)?.into_iter().collect();
            uids.sort_unstable();
            debug!("IMAP search '{query}' matched {} messages", uids.len());
            Ok(uids)
        })
    }

    fn metadata(&mut self, id: EmailId) -> Result<EmailRecord> {
        self.with_session(|s| {
            let fetches = s.uid_fetch(id.to_string(), "(UID ENVELOPE INTERNALDATE)")?;
            let f = fetches
                .iter()
                .next()
                .ok_or_else(|| anyhow!("email UID {id} not found"))?;

            let env = f.envelope();
            let subject = env
                .and_then(|e| e.subject.as_deref())
                .map(decode_subject)
                .unwrap_or_else(|| "(no subject)".to_string());
            let sender = env
                .and_then(|e| e.from.as_ref())
                .and_then(|froms| froms.first())
                .map(|a| format_sender(a.name.as_deref(), a.mailbox.as_deref(), a.host.as_deref()))
                .unwrap_or_else(|| "(unknown)".to_string());
            let date = env
                .and_then(|e| e.date.as_deref())
                .map(|d| String::from_utf8_lossy(d).trim().to_string())
                .unwrap_or_default();
            let internal_date = f
                .internal_date()
                .map(|d| d.timestamp_millis())
                .unwrap_or(0);

            Ok(EmailRecord {
                id,
                sender,
                subject,
                date,
                internal_date,
                body: None,
            })
        })
    }

    fn body(&mut self, id: EmailId) -> Result<String> {
        self.with_session(|s| {
            let fetches = s.uid_fetch(id.to_string(), "(UID BODY.PEEK[])")?;
            let f = fetches
                .iter()
                .next()
                .ok_or_else(|| anyhow!("email UID {id} not found"))?;
            match f.body() {
                Some(raw) => Ok(body_text(raw)),
                None => {
                    warn!("UID {id}: fetch returned no body");
                    Err(anyhow!("UID {id}: missing body"))
                }
            }
        })
    }
}

impl Drop for ImapMailService {
    fn drop(&mut self) {
        if let Some(mut s) = self.session.take() {
            let _ = s.logout();
        }
    }
}
