//! Authenticated user session

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Proof of a successful login, passed explicitly to every authenticated
/// handler. Dropping or consuming it ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    id: Uuid,
    username: String,
    logged_in_at: DateTime<Utc>,
}

impl Session {
    /// Sessions are only created by a successful login.
    pub(crate) fn start(username: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            logged_in_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn logged_in_at(&self) -> DateTime<Utc> {
        self.logged_in_at
    }
}
