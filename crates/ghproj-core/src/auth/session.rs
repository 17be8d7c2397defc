use std::env;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Environment variables consulted for an ambient token, in priority order.
const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Represents a persisted GitHub authentication session.
///
/// GitHub personal access tokens are long-lived, so a session is just the
/// token plus bookkeeping about when it was stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,
}

fn default_created_at() -> DateTime<Utc> {
    Utc::now()
}

impl AuthSession {
    pub fn new(token: String) -> Result<Self, AuthError> {
        let token = token.trim().to_owned();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self {
            token,
            created_at: Utc::now(),
        })
    }

    /// Build a session from `GITHUB_TOKEN`/`GH_TOKEN` if either is set.
    pub fn from_env() -> Option<Self> {
        for var in TOKEN_ENV_VARS {
            if let Ok(token) = env::var(var) {
                if !token.trim().is_empty() {
                    return Self::new(token).ok();
                }
            }
        }
        None
    }

    /// Value for the `Authorization` header on API requests.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}
