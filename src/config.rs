use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory with home.html, chatbot.html, script.js and other static assets.
    pub web_root: Option<String>,
    pub db_path: Option<String>,
    #[serde(default = "default_true")]
    pub open_browser: bool,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub api_base: Option<String>,
    /// Environment variable holding the API key; the keyring is tried after it.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct MailConfig {
    #[serde(default)]
    pub client_id: String,
    pub imap_server: Option<String>,
    pub user_email: Option<String>,
    pub redirect_uri: Option<String>,
    pub mailbox: Option<String>,
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            api_base: None,
            api_key_env: default_api_key_env(),
            system_prompt: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            web_root: None,
            db_path: None,
            open_browser: true,
            model: ModelConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl MailConfig {
    pub fn imap_server(&self) -> String {
        self.imap_server
            .clone()
            .unwrap_or_else(|| "imap.gmail.com".to_string())
    }

    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8080/callback".to_string())
    }

    pub fn mailbox(&self) -> String {
        self.mailbox.clone().unwrap_or_else(|| "INBOX".to_string())
    }
}

/// `<config_dir>/policy_chat`, created if missing.
pub fn config_dir() -> Result<PathBuf> {
    let p = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("policy_chat");
    fs::create_dir_all(&p)?;
    Ok(p)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("users.db"))
}

pub fn parse_config(s: &str) -> Result<Config> {
    Ok(toml::from_str(s)?)
}

/// Loads the config file, writing a template with defaults on first run.
pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let sample = Config {
            web_root: Some("web".to_string()),
            mail: MailConfig {
                client_id: "YOUR_CLIENT_ID.apps.googleusercontent.com".to_string(),
                imap_server: Some("imap.gmail.com".to_string()),
                user_email: None,
                redirect_uri: Some("http://127.0.0.1:8080/callback".to_string()),
                mailbox: Some("INBOX".to_string()),
            },
            ..Config::default()
        };
        fs::write(&path, toml::to_string_pretty(&sample)?)?;
        info!(
            "created template config at {}; edit the [mail] section to enable e-mail",
            path.display()
        );
        return Ok(sample);
    }
    parse_config(&fs::read_to_string(path)?)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}

pub fn resolve_web_root(cfg: &Config) -> PathBuf {
    PathBuf::from(cfg.web_root.as_deref().unwrap_or("web"))
}
