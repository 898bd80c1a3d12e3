use std::fmt;

use serde::{Deserialize, Serialize};

/// Credentials captured from a successful login.
///
/// Created once per session and never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access_token: String,
    pub user_id: String,
    pub wallet_id: String,
}

impl SessionCredentials {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        user_id: impl Into<String>,
        wallet_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            wallet_id: wallet_id.into(),
        }
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Keep tokens out of logs.
impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("wallet_id", &self.wallet_id)
            .finish()
    }
}

/// Lifecycle state of one virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualUserState {
    Initializing,
    Authenticated,
    Running,
    Stopped,
}

impl VirtualUserState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Authenticated => "authenticated",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    /// Returns `true` once the user can no longer generate load.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for VirtualUserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
