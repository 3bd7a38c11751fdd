//! Account signup and login

use crate::config::AuthConfig;
use crate::session::Session;
use crate::store::{Store, StoreError};
use bcrypt::{hash, verify};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Please enter username and password")]
    EmptyCredentials,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Password must be at least {0} characters long")]
    PasswordTooShort(usize),
    #[error("Username already exists")]
    UsernameTaken,
    #[error("User not found")]
    UserNotFound,
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("Password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Signup and login against the users table
pub struct AuthService {
    store: Store,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(store: Store, config: AuthConfig) -> Self {
        Self { store, config }
    }

    /// Create a new account
    pub fn signup(&self, username: &str, password: &str, confirm: &str) -> Result<(), AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::EmptyCredentials);
        }
        if password != confirm {
            return Err(AuthError::PasswordMismatch);
        }
        if password.chars().count() < self.config.min_password_len {
            return Err(AuthError::PasswordTooShort(self.config.min_password_len));
        }
        if self.store.user_exists(username)? {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = hash(password, self.config.bcrypt_cost)?;
        // A concurrent signup can still win the unique constraint
        if !self.store.insert_user(username, &password_hash)? {
            return Err(AuthError::UsernameTaken);
        }

        info!(username = %username, "Account created");
        Ok(())
    }

    /// Check credentials and start a session
    pub fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::EmptyCredentials);
        }

        let user = self
            .store
            .find_user(username)?
            .ok_or(AuthError::UserNotFound)?;

        if !verify(password, &user.password_hash)? {
            warn!(username = %username, "Login rejected: incorrect password");
            return Err(AuthError::IncorrectPassword);
        }

        let session = Session::start(&user.username);
        info!(username = %username, session = %session.id(), "Logged in");
        Ok(session)
    }

    /// End a session
    pub fn logout(&self, session: Session) {
        info!(username = %session.username(), session = %session.id(), "Logged out");
    }
}
