//! Mock account store used when the auth API is unreachable
//!
//! Accounts live in a JSON file next to the session state. This is a
//! development fallback, not a credential store; passwords are kept only as
//! blake3 digests so the file never holds them in the clear.

use anyhow::{Context, Result};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::context::User;
use super::AuthError;
use crate::identity::time_prefixed_id;

const USERS_FILE: &str = "users.json";

#[derive(Serialize, Deserialize, Debug, Clone)]
struct StoredAccount {
    id: String,
    email: String,
    /// `None` for accounts created through the simulated Google sign-in
    password_hash: Option<String>,
    username: Option<String>,
}

impl StoredAccount {
    fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
        }
    }
}

fn hash_password(password: &str) -> String {
    blake3::hash(password.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone)]
pub struct LocalAccounts {
    path: PathBuf,
}

impl LocalAccounts {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(USERS_FILE),
        }
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let digest = hash_password(password);
        self.read()
            .iter()
            .find(|a| a.email == email && a.password_hash.as_deref() == Some(digest.as_str()))
            .map(StoredAccount::to_user)
            .ok_or_else(|| AuthError::Rejected("Invalid credentials".to_string()))
    }

    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: Option<&str>,
    ) -> Result<User, AuthError> {
        let mut accounts = self.read();
        if accounts.iter().any(|a| a.email == email) {
            return Err(AuthError::Rejected("User already exists".to_string()));
        }

        let account = StoredAccount {
            id: time_prefixed_id(),
            email: email.to_string(),
            password_hash: Some(hash_password(password)),
            username: username.map(str::to_string),
        };
        let user = account.to_user();
        accounts.push(account);
        self.write(&accounts)?;

        info!("Created local account {}", user.id);
        Ok(user)
    }

    /// Simulated Google sign-in: finds or creates a throwaway Google user
    pub fn sign_in_with_google(&self) -> Result<User, AuthError> {
        let email = format!(
            "google_user_{}@example.com",
            rand::thread_rng().gen_range(0..10000)
        );

        let mut accounts = self.read();
        if let Some(existing) = accounts.iter().find(|a| a.email == email) {
            return Ok(existing.to_user());
        }

        let account = StoredAccount {
            id: time_prefixed_id(),
            email,
            password_hash: None,
            username: Some("Google User".to_string()),
        };
        let user = account.to_user();
        accounts.push(account);
        self.write(&accounts)?;
        Ok(user)
    }

    /// Nothing is sent; only checks that the account exists
    pub fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        if self.read().iter().any(|a| a.email == email) {
            Ok(())
        } else {
            Err(AuthError::Rejected("Email not found".to_string()))
        }
    }

    fn read(&self) -> Vec<StoredAccount> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable accounts file {:?}: {}", self.path, e);
            Vec::new()
        })
    }

    fn write(&self, accounts: &[StoredAccount]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, serde_json::to_string_pretty(accounts)?)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_then_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = LocalAccounts::new(dir.path());

        let created = accounts.sign_up("amal@example.org", "s3cret", Some("Amal")).unwrap();
        let signed_in = accounts.sign_in("amal@example.org", "s3cret").unwrap();
        assert_eq!(created, signed_in);
        assert_eq!(signed_in.username.as_deref(), Some("Amal"));
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = LocalAccounts::new(dir.path());
        accounts.sign_up("amal@example.org", "s3cret", None).unwrap();

        let err = accounts.sign_in("amal@example.org", "guess").unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_duplicate_sign_up_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = LocalAccounts::new(dir.path());
        accounts.sign_up("amal@example.org", "s3cret", None).unwrap();

        let err = accounts.sign_up("amal@example.org", "other", None).unwrap_err();
        assert_eq!(err.to_string(), "User already exists");
    }

    #[test]
    fn test_passwords_are_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = LocalAccounts::new(dir.path());
        accounts.sign_up("amal@example.org", "s3cret", None).unwrap();

        let raw = fs::read_to_string(dir.path().join(USERS_FILE)).unwrap();
        assert!(!raw.contains("s3cret"));
    }

    #[test]
    fn test_google_users_cannot_sign_in_with_password() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = LocalAccounts::new(dir.path());

        let user = accounts.sign_in_with_google().unwrap();
        assert!(user.email.starts_with("google_user_"));
        assert!(accounts.sign_in(&user.email, "").is_err());
    }

    #[test]
    fn test_reset_password() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = LocalAccounts::new(dir.path());
        accounts.sign_up("amal@example.org", "s3cret", None).unwrap();

        assert!(accounts.reset_password("amal@example.org").is_ok());
        let err = accounts.reset_password("nobody@example.org").unwrap_err();
        assert_eq!(err.to_string(), "Email not found");
    }
}
