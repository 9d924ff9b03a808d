//! Authenticated caller context, passed explicitly to operations that need it.

use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub role: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role: "user".to_string(),
            token: None,
        }
    }

    pub fn admin(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            role: ADMIN_ROLE.to_string(),
            ..Self::new(user_id, username)
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}
