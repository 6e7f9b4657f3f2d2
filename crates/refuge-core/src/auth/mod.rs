//! Sign-in collaborator for the chat screen
//!
//! The remote API is always tried first. Only when it cannot be reached at all,
//! and the local fallback is enabled, do the mock accounts answer instead. A
//! rejection from the API is final.

pub mod context;
pub mod local;
pub mod remote;

use log::{info, warn};
use std::path::Path;
use thiserror::Error;

use crate::config::Config;
pub use context::{SessionContext, User};
pub use local::LocalAccounts;
pub use remote::{token_from_callback, AuthClient};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials or input refused; the message is shown on the form as-is
    #[error("{0}")]
    Rejected(String),
    #[error("Could not reach the sign-in service: {0}")]
    Unreachable(String),
    #[error("Unexpected response from the sign-in service: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::InvalidResponse(e.to_string())
        } else {
            AuthError::Unreachable(e.to_string())
        }
    }
}

/// How a Google sign-in continues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleSignIn {
    /// Open this URL in a browser and bring back the callback URL
    Redirect(String),
    /// Signed in with a simulated local account
    SignedIn(User),
}

#[derive(Clone)]
pub struct Authenticator {
    remote: AuthClient,
    local: Option<LocalAccounts>,
}

impl Authenticator {
    pub fn new(remote: AuthClient, local: Option<LocalAccounts>) -> Self {
        Self { remote, local }
    }

    pub fn from_config(config: &Config, data_dir: &Path) -> Self {
        let local = config
            .local_auth_fallback()
            .then(|| LocalAccounts::new(data_dir));
        Self::new(AuthClient::new(config.api_url()), local)
    }

    /// Sign in and record the user (and token, when the API issued one) in `context`
    pub async fn login(
        &self,
        context: &mut SessionContext,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        match self.remote.login(email, password).await {
            Ok(token) => {
                let user = User::from_email(email);
                context.set_access_token(Some(token))?;
                context.persist(Some(user.clone()))?;
                info!("Signed in via auth API");
                Ok(user)
            }
            Err(AuthError::Unreachable(reason)) => {
                let local = self.fallback(reason)?;
                let user = local.sign_in(email, password)?;
                context.persist(Some(user.clone()))?;
                info!("Signed in with local account");
                Ok(user)
            }
            Err(e) => Err(e),
        }
    }

    /// Create an account. The caller still has to sign in afterwards.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<(), AuthError> {
        match self.remote.signup(email, password, name).await {
            Ok(_) => Ok(()),
            Err(AuthError::Unreachable(reason)) => {
                self.fallback(reason)?.sign_up(email, password, name)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn google(&self, context: &mut SessionContext) -> Result<GoogleSignIn, AuthError> {
        if let Some(local) = &self.local {
            if !self.remote.is_reachable().await {
                warn!("Auth API unreachable, simulating Google sign-in locally");
                let user = local.sign_in_with_google()?;
                context.persist(Some(user.clone()))?;
                return Ok(GoogleSignIn::SignedIn(user));
            }
        }

        Ok(GoogleSignIn::Redirect(self.remote.google_login_url()))
    }

    /// Finish the OAuth flow from the URL the browser landed on
    pub fn complete_google(
        &self,
        context: &mut SessionContext,
        callback_url: &str,
    ) -> Result<(), AuthError> {
        let token = token_from_callback(callback_url).ok_or_else(|| {
            AuthError::Rejected("No sign-in token found in that address".to_string())
        })?;
        context.set_access_token(Some(token))?;
        Ok(())
    }

    pub fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        match &self.local {
            Some(local) => local.reset_password(email),
            None => Err(AuthError::Rejected(
                "Password reset is not available".to_string(),
            )),
        }
    }

    fn fallback(&self, reason: String) -> Result<&LocalAccounts, AuthError> {
        match &self.local {
            Some(local) => {
                warn!("Auth API unreachable ({}), using local accounts", reason);
                Ok(local)
            }
            None => Err(AuthError::Unreachable(reason)),
        }
    }
}
