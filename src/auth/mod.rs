pub mod oauth;
pub mod token_manager;
pub mod token_store;
pub mod tokens_file;

/// Full-mailbox scope; XOAUTH2 over IMAP needs it.
pub const MAIL_SCOPE: &str = "https://mail.google.com/";
