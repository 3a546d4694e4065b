//! OAuth2 token management for the calendar API.
//!
//! Tokens are persisted as a JSON file at the configured path and refreshed
//! against the provider's token endpoint shortly before expiry. The initial
//! grant is obtained through a console flow: the consent URL is printed and
//! the authorization code read back from stdin.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use calbridge_domain::{CalBridgeError, CalendarConfig, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info};
use url::form_urlencoded;

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";
const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Access tokens are refreshed when closer than this to expiry.
const REFRESH_THRESHOLD_SECONDS: i64 = 60;

/// Persisted OAuth credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl TokenSet {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .map_or(false, |expiry| expiry - now < Duration::seconds(REFRESH_THRESHOLD_SECONDS))
    }
}

/// Loads, refreshes and persists the calendar token set.
pub struct TokenManager {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    token_path: PathBuf,
    token_endpoint: String,
    http: reqwest::Client,
    cached: Mutex<Option<TokenSet>>,
}

impl TokenManager {
    pub fn new(config: &CalendarConfig) -> Result<Self> {
        Self::with_token_endpoint(config, GOOGLE_TOKEN_ENDPOINT)
    }

    fn with_token_endpoint(config: &CalendarConfig, token_endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build().map_err(|err| {
            CalBridgeError::Internal(format!("failed to construct HTTP client: {err}"))
        })?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            token_path: PathBuf::from(&config.token_path),
            token_endpoint: token_endpoint.to_string(),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Consent URL to open in a browser for the initial grant.
    pub fn authorization_url(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", CALENDAR_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .finish();
        format!("{GOOGLE_AUTH_ENDPOINT}?{query}")
    }

    /// Load stored tokens, or run the interactive console flow when the
    /// token file does not exist yet.
    pub async fn ensure_authorized(&self) -> Result<()> {
        if self.token_path.exists() {
            let tokens = self.load_tokens()?;
            *self.cached.lock().await = Some(tokens);
            return Ok(());
        }

        let tokens = self.authorize_interactive().await?;
        self.save_tokens(&tokens)?;
        *self.cached.lock().await = Some(tokens);
        Ok(())
    }

    /// Current access token, refreshed as needed.
    pub async fn access_token(&self) -> Result<String> {
        let mut guard = self.cached.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_tokens()?);
        }
        let Some(tokens) = guard.as_mut() else {
            return Err(CalBridgeError::Internal("token cache unexpectedly empty".into()));
        };

        if tokens.needs_refresh(Utc::now()) {
            let refreshed = self.refresh(tokens).await?;
            *tokens = refreshed;
            self.save_tokens(tokens)?;
        }

        Ok(tokens.access_token.clone())
    }

    async fn authorize_interactive(&self) -> Result<TokenSet> {
        println!("Open the following link in your browser:\n{}\n", self.authorization_url());
        print!("Enter authorization code: ");
        io::stdout()
            .flush()
            .map_err(|err| CalBridgeError::Internal(format!("failed to flush stdout: {err}")))?;

        let line = task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|err| CalBridgeError::Internal(format!("stdin task failed: {err}")))?
        .map_err(|err| {
            CalBridgeError::Auth(format!("failed to read authorization code: {err}"))
        })?;

        let code = line.trim();
        if code.is_empty() {
            return Err(CalBridgeError::Auth("empty authorization code".into()));
        }

        self.exchange_code(code).await
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|err| {
                CalBridgeError::Auth(format!("token exchange request failed: {err}"))
            })?;

        parse_token_response(response, None).await
    }

    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet> {
        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(CalBridgeError::Auth(
                "access token expired and no refresh token is available".into(),
            ));
        };

        debug!("refreshing calendar access token");
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|err| CalBridgeError::Auth(format!("token refresh request failed: {err}")))?;

        // Providers omit the refresh token on refresh; keep the stored one.
        parse_token_response(response, tokens.refresh_token.clone()).await
    }

    fn load_tokens(&self) -> Result<TokenSet> {
        let contents = fs::read_to_string(&self.token_path).map_err(|err| {
            CalBridgeError::Auth(format!(
                "failed to read token file {}: {err}",
                self.token_path.display()
            ))
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            CalBridgeError::Auth(format!(
                "invalid token file {}: {err}",
                self.token_path.display()
            ))
        })
    }

    fn save_tokens(&self, tokens: &TokenSet) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    CalBridgeError::Internal(format!(
                        "failed to create token directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(tokens)
            .map_err(|err| CalBridgeError::Internal(format!("failed to encode tokens: {err}")))?;
        fs::write(&self.token_path, contents).map_err(|err| {
            CalBridgeError::Internal(format!(
                "failed to write token file {}: {err}",
                self.token_path.display()
            ))
        })?;

        info!(path = %self.token_path.display(), "saved calendar token set");
        Ok(())
    }
}

async fn parse_token_response(
    response: reqwest::Response,
    fallback_refresh: Option<String>,
) -> Result<TokenSet> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
        return Err(CalBridgeError::Auth(format!("token endpoint returned {status}: {body}")));
    }

    let wire: TokenResponse = response
        .json()
        .await
        .map_err(|err| CalBridgeError::Auth(format!("failed to parse token response: {err}")))?;

    Ok(TokenSet {
        access_token: wire.access_token,
        refresh_token: wire.refresh_token.or(fallback_refresh),
        expiry: Some(Utc::now() + Duration::seconds(wire.expires_in)),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}
