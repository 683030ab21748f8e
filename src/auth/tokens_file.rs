use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::config::config_dir;

/// Non-secret access token cache, `<config_dir>/policy_chat/tokens.json`.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokensFile {
    pub access_token: Option<String>,
    pub expires_at_epoch: Option<i64>, // epoch seconds
}

impl TokensFile {
    /// The cached access token, if it is still valid at `now`.
    pub fn fresh_token(&self, now: i64) -> Option<&str> {
        match (&self.access_token, self.expires_at_epoch) {
            (Some(at), Some(exp)) if now < exp => Some(at.as_str()),
            _ => None,
        }
    }
}

fn tokens_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("tokens.json"))
}

pub fn save_tokens(access_token: Option<&str>, expires_at_epoch: Option<i64>) -> Result<()> {
    let tf = TokensFile {
        access_token: access_token.map(|s| s.to_string()),
        expires_at_epoch,
    };
    fs::write(tokens_path()?, serde_json::to_string_pretty(&tf)?)?;
    Ok(())
}

pub fn load_tokens() -> Result<Option<TokensFile>> {
    let p = tokens_path()?;
    if !p.exists() {
        return Ok(None);
    }
    let tf: TokensFile = serde_json::from_str(&fs::read_to_string(&p)?)?;
    Ok(Some(tf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_respects_expiry() {
        let tf = TokensFile {
            access_token: Some("abc".into()),
            expires_at_epoch: Some(1_000),
        };
        assert_eq!(tf.fresh_token(999), Some("abc"));
        assert_eq!(tf.fresh_token(1_000), None);
        assert_eq!(TokensFile::default().fresh_token(0), None);
    }
}
