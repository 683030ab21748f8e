use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

use policy_chat::auth::{token_manager::TokenManager, token_store};
use policy_chat::config::{load_config, resolve_db_path, resolve_web_root};
use policy_chat::extract::TextExtractor;
use policy_chat::llm::gemini::GeminiClient;
use policy_chat::mail::imap_client::{ImapClient, ImapConnector};
use policy_chat::mail::{MailConnector, Unavailable};
use policy_chat::server::{ServerConfig, bind, run_server};
use policy_chat::session::ChatService;
use policy_chat::store::load_users_file;
use policy_chat::store::repo::UserStore;
use policy_chat::store::sqlite::SqliteUserStore;

#[derive(Parser)]
#[command(name = "policy_chat")]
#[command(about = "Insurance policy chat assistant (local web demo)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the chat UI for one user
    Serve {
        #[arg(long)]
        user: String,

        #[arg(long, default_value = "default")]
        session_id: String,

        /// Overrides `port` from the config file
        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        no_browser: bool,
    },

    /// Load demo users and their policies from a JSON file into the store
    SeedUsers {
        #[arg(long)]
        file: PathBuf,
    },

    /// Store the OAuth client secret in keyring
    SetClientSecret {
        #[arg(long)]
        client_id: String,
    },

    /// Store the model API key in keyring
    SetModelKey,
}

fn read_secret(prompt: &str) -> Result<String> {
    eprintln!("{prompt} (end with Ctrl-D):");
    let mut secret = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
    Ok(secret.trim().to_string())
}

fn mail_connector(cfg: &policy_chat::config::MailConfig) -> Box<dyn MailConnector> {
    match TokenManager::from_config(cfg) {
        Ok(tokens) => {
            let imap = ImapClient::new(cfg.imap_server(), tokens.user_email.clone(), cfg.mailbox());
            Box::new(ImapConnector::new(imap, tokens))
        }
        Err(e) => {
            warn!("e-mail disabled: {e}");
            Box::new(Unavailable::new(e.to_string()))
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::SetClientSecret { client_id } => {
            let secret = read_secret("Paste client secret")?;
            token_store::save_client_secret(&client_id, &secret)?;
            println!("Saved client secret for client_id {}", client_id);
            Ok(())
        }

        Command::SetModelKey => {
            let key = read_secret("Paste model API key")?;
            if key.is_empty() {
                bail!("empty API key");
            }
            token_store::save_model_key(&key)?;
            println!("Saved model API key");
            Ok(())
        }

        Command::SeedUsers { file } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let store = SqliteUserStore::open(&resolve_db_path(&cfg)?)?;
            let users = load_users_file(&file)?;
            for user in &users {
                store.upsert_user(user)?;
            }
            println!("Seeded {} users from {}", users.len(), file.display());
            Ok(())
        }

        Command::Serve {
            user,
            session_id,
            port,
            no_browser,
        } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let store = SqliteUserStore::open(&resolve_db_path(&cfg)?)?;
            if store.find_user(&user)?.is_none() {
                let known = store.user_ids()?;
                bail!(
                    "unknown user '{user}' (known: {}); run seed-users first",
                    if known.is_empty() { "none".to_string() } else { known.join(", ") }
                );
            }

            let model = GeminiClient::from_config(&cfg.model)?;
            info!("model: {}", model.model());

            let mut service = ChatService::new(
                Box::new(store),
                Box::new(model),
                Box::new(TextExtractor),
                mail_connector(&cfg.mail),
            );
            if let Some(prompt) = &cfg.model.system_prompt {
                service = service.with_system_prompt(prompt.clone());
            }
            service.handle_focus(&user, &session_id);

            let server_cfg = ServerConfig {
                port: port.unwrap_or(cfg.port),
                web_root: resolve_web_root(&cfg),
            };
            let server = bind(&server_cfg)?;

            if cfg.open_browser && !no_browser {
                let url = format!("http://{}/chatbot.html", server_cfg.addr());
                if let Err(e) = open::that(&url) {
                    warn!("could not open browser automatically: {e}");
                }
            }

            run_server(server, &mut service, &server_cfg)
        }
    }
}
