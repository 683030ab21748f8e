use anyhow::{Result, anyhow};
use log::{info, warn};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::oauth::{self, Tokens};
use crate::auth::{MAIL_SCOPE, token_store, tokens_file};
use crate::config::MailConfig;

/// Assumed lifetime when the provider omits `expires_in`.
const DEFAULT_TOKEN_SECS: i64 = 3500;

#[derive(Debug, Clone)]
pub struct TokenManager {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub user_email: String,
}

impl TokenManager {
    pub fn from_config(cfg: &MailConfig) -> Result<Self> {
        if cfg.client_id.trim().is_empty() || cfg.client_id.starts_with("YOUR_CLIENT_ID") {
            return Err(anyhow!("mail.client_id not set in config"));
        }
        let user_email = cfg
            .user_email
            .clone()
            .ok_or_else(|| anyhow!("mail.user_email not set in config"))?;

        let client_secret = token_store::load_client_secret(&cfg.client_id)?
            .or_else(|| std::env::var("OAUTH_CLIENT_SECRET").ok());

        Ok(Self {
            client_id: cfg.client_id.clone(),
            client_secret,
            redirect_uri: cfg.redirect_uri(),
            user_email,
        })
    }

    /// Cached token if still valid, else refresh, else interactive PKCE.
    pub fn get_access_token(&self) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        if let Some(tf) = tokens_file::load_tokens()?
            && let Some(at) = tf.fresh_token(now)
        {
            return Ok(at.to_string());
        }

        if let Some(rt) = token_store::load_refresh_token(&self.user_email)? {
            match oauth::refresh_access_token(&self.client_id, self.client_secret.as_deref(), &rt)
            {
                Ok(t) => return self.remember(t, now),
                Err(e) => warn!("refresh failed, falling back to interactive auth: {e}"),
            }
        }

        let t = oauth::perform_pkce_flow(
            &self.client_id,
            self.client_secret.as_deref(),
            &self.redirect_uri,
            MAIL_SCOPE,
        )?;
        self.remember(t, now)
    }

    fn remember(&self, t: Tokens, now: i64) -> Result<String> {
        if let Some(rt) = &t.refresh_token {
            match token_store::save_refresh_token(&self.user_email, rt) {
                Ok(()) => info!("saved refresh token for {}", self.user_email),
                Err(e) => warn!("couldn't save refresh token to keyring: {e}"),
            }
        }
        let exp = t
            .expires_in
            .map(|s| now + s as i64)
            .unwrap_or(now + DEFAULT_TOKEN_SECS);
        tokens_file::save_tokens(Some(&t.access_token), Some(exp))?;
        Ok(t.access_token)
    }
}
