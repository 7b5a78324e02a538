use serde::{Deserialize, Serialize};

/// Authenticated user, supplied by the authentication layer. The VFS
/// treats it as read-only input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub user: User,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self { user }
    }
}
