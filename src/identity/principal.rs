use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Public view of a user, hydrated for login responses. Roles are a proper
/// set: storage-side duplicates and ordering collapse here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

/// Listing entry for the administrative user index; includes the storage id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}
