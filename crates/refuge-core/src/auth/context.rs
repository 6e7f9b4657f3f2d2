//! Signed-in user and access token for this device
//!
//! The context is an explicit value handed to whatever needs it. Nothing else
//! reads `session.json` directly.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SESSION_FILE: &str = "session.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
}

impl User {
    /// User known only by the email it signed in with
    pub fn from_email(email: &str) -> Self {
        Self {
            id: email.to_string(),
            email: email.to_string(),
            username: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct StoredSession {
    user: Option<User>,
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    path: PathBuf,
    user: Option<User>,
    access_token: Option<String>,
}

impl SessionContext {
    /// Read the saved session from `dir`. A missing or unreadable file means signed out.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SESSION_FILE);

        let stored = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring corrupt session file {:?}: {}", path, e);
                StoredSession::default()
            })
        } else {
            StoredSession::default()
        };

        Ok(Self {
            path,
            user: stored.user,
            access_token: stored.access_token,
        })
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Either a user record or an access token gates the chat screen
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() || self.access_token.is_some()
    }

    /// Replace the signed-in user (or clear it with `None`) and write it out
    pub fn persist(&mut self, user: Option<User>) -> Result<()> {
        self.user = user;
        self.save()
    }

    pub fn set_access_token(&mut self, token: Option<String>) -> Result<()> {
        self.access_token = token;
        self.save()
    }

    pub fn sign_out(&mut self) -> Result<()> {
        self.user = None;
        self.access_token = None;
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredSession {
            user: self.user.clone(),
            access_token: self.access_token.clone(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}
