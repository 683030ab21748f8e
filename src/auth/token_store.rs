//! Secrets in the OS keyring: OAuth client secret, IMAP refresh token, model API key.

use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "policy_chat";
const MODEL_KEY_ACCOUNT: &str = "model-api-key";

fn save(account: &str, secret: &str) -> Result<()> {
    Entry::new(SERVICE, account)?
        .set_password(secret)
        .map_err(|e| anyhow!(e.to_string()))
}

fn load(account: &str) -> Result<Option<String>> {
    match Entry::new(SERVICE, account)?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// Keyed by the mailbox address.
pub fn save_refresh_token(user_email: &str, refresh_token: &str) -> Result<()> {
    save(user_email, refresh_token)
}

pub fn load_refresh_token(user_email: &str) -> Result<Option<String>> {
    load(user_email)
}

/// Keyed by the OAuth client id.
pub fn save_client_secret(client_id: &str, client_secret: &str) -> Result<()> {
    save(client_id, client_secret)
}

pub fn load_client_secret(client_id: &str) -> Result<Option<String>> {
    load(client_id)
}

pub fn save_model_key(api_key: &str) -> Result<()> {
    save(MODEL_KEY_ACCOUNT, api_key)
}

pub fn load_model_key() -> Result<Option<String>> {
    load(MODEL_KEY_ACCOUNT)
}
