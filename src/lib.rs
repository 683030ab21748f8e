pub mod auth;
pub mod chat;
pub mod config;
pub mod domain;
pub mod extract;
pub mod llm;
pub mod mail;
pub mod server;
pub mod session;
pub mod store;
