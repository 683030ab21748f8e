use anyhow::Result;
use std::path::Path;

use crate::domain::user::UserRecord;

/// The server-side record of users and their uploaded policies.
pub trait UserStore {
    fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>>;
    /// Replaces the user row and their whole policy list.
    fn upsert_user(&self, user: &UserRecord) -> Result<()>;
    fn record_extraction(&self, user_id: &str, file_id: &str, text_path: &Path) -> Result<()>;
    fn user_ids(&self) -> Result<Vec<String>>;
}
