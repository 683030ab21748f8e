pub mod repo;
pub mod sqlite;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::domain::user::UserRecord;

/// Read a JSON array of users (the demo seed format).
pub fn load_users_file(path: &Path) -> Result<Vec<UserRecord>> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading users file {}", path.display()))?;
    let users: Vec<UserRecord> = serde_json::from_str(&s)
        .with_context(|| format!("parsing users file {}", path.display()))?;
    Ok(users)
}
