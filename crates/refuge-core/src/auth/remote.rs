use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::AuthError;

#[derive(Serialize)]
struct SignupRequest<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    // A string for most errors, a list of field errors for validation failures
    detail: Option<serde_json::Value>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the HTTP auth API
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Client whose requests give up after `timeout` without a response
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Form-encoded login; returns the access token
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let url = format!("{}/auth/login", self.base_url);

        let response = self
            .client
            .post(&url)
            .form(&[("username", email), ("password", password)])
            .send()
            .await?;

        token_from(response, "Login failed").await
    }

    /// JSON signup. `name` falls back to the local part of the email.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<String, AuthError> {
        let url = format!("{}/auth/signup", self.base_url);
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email));

        let response = self
            .client
            .post(&url)
            .json(&SignupRequest { email, password, name })
            .send()
            .await?;

        token_from(response, "Signup failed").await
    }

    /// Entry point of the browser-based Google OAuth flow
    pub fn google_login_url(&self) -> String {
        format!("{}/auth/login/google", self.base_url)
    }

    /// Whether the API answers at all (any HTTP status counts)
    pub async fn is_reachable(&self) -> bool {
        self.client
            .get(&self.base_url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .is_ok()
    }
}

async fn token_from(response: Response, fallback: &str) -> Result<String, AuthError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.detail)
            .map(|detail| match detail {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            })
            .unwrap_or_else(|| fallback.to_string());
        return Err(AuthError::Rejected(detail));
    }

    serde_json::from_str::<TokenResponse>(&body)
        .map(|t| t.access_token)
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))
}

/// Read the `token` query parameter the OAuth redirect lands with
pub fn token_from_callback(callback_url: &str) -> Option<String> {
    Url::parse(callback_url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}
