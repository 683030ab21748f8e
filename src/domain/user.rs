use serde::{Deserialize, Serialize};

use crate::domain::policy::Policy;

/// A user as the external user store knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub policies: Vec<Policy>,
}
