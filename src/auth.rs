//! Access tokens for Google APIs: user OAuth, service accounts and fixed tokens.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{DriveConfig, DRIVE_SCOPE};
use crate::credential::{Credential, TokenStore, TOKEN_URI};
use crate::error::{DriveError, Result};
use crate::login::{LoginFlow, LoopbackLogin};
use crate::models::{ServiceAccountCredentials, TokenResponse};

/// Supplies the bearer token for each API request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A bearer token obtained elsewhere.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// User credential backed by a token file, refreshed in place and replaced
/// through the login flow when it can no longer be refreshed.
#[derive(Clone)]
pub struct Authenticator {
    store: TokenStore,
    login: Arc<dyn LoginFlow>,
    scope: String,
    http: Client,
    current: Arc<RwLock<Option<Credential>>>,
}

impl Authenticator {
    /// Token file and interactive loopback login as configured.
    pub fn from_config(config: &DriveConfig) -> Self {
        Self::new(
            TokenStore::new(&config.token_path),
            Arc::new(LoopbackLogin::new(&config.client_secrets_path)),
            config.scope.clone(),
        )
    }

    pub fn new(store: TokenStore, login: Arc<dyn LoginFlow>, scope: impl Into<String>) -> Self {
        Self {
            store,
            login,
            scope: scope.into(),
            http: Client::new(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Produce a usable credential.
    ///
    /// Order: unexpired persisted credential, then refresh, then one
    /// interactive login. A failed refresh deletes the token file. If the
    /// login also fails the result is `AuthenticationFailed`.
    pub async fn bootstrap(&self) -> Result<Credential> {
        let now = OffsetDateTime::now_utc();
        let cached = self.current.read().await.clone();
        let existing = match cached {
            Some(credential) => Some(credential),
            None => self.store.load()?,
        };

        if let Some(credential) = existing {
            if !credential.is_expired(now) {
                return self.adopt(credential, false).await;
            }

            if credential.refresh_token.is_some() {
                match credential.refresh(&self.http).await {
                    Ok(refreshed) => {
                        info!("access token refreshed");
                        return self.adopt(refreshed, true).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "refresh failed, discarding {}", self.store.path().display());
                        self.store.remove()?;
                        *self.current.write().await = None;
                    }
                }
            }
        }

        debug!(scope = %self.scope, "starting interactive login");
        let credential = self
            .login
            .login(&self.scope)
            .await
            .map_err(|e| DriveError::AuthenticationFailed(e.to_string()))?;
        self.adopt(credential, true).await
    }

    async fn adopt(&self, credential: Credential, persist: bool) -> Result<Credential> {
        if persist {
            self.store.save(&credential)?;
        }
        *self.current.write().await = Some(credential.clone());
        Ok(credential)
    }
}

#[async_trait]
impl TokenSource for Authenticator {
    async fn access_token(&self) -> Result<String> {
        {
            let current = self.current.read().await;
            if let Some(credential) = current.as_ref() {
                if !credential.is_expired(OffsetDateTime::now_utc()) {
                    return Ok(credential.token.clone());
                }
            }
        }

        Ok(self.bootstrap().await?.token)
    }
}

/// Assertion signed with the service account key.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

/// Lifetime requested for each signed assertion.
const ASSERTION_LIFETIME: Duration = Duration::hours(1);

#[derive(Clone)]
struct IssuedToken {
    access_token: String,
    expires_at: OffsetDateTime,
}

/// Non-interactive authentication with a service account key.
#[derive(Clone)]
pub struct ServiceAccountAuthenticator {
    credentials: Arc<ServiceAccountCredentials>,
    scope: String,
    http: Client,
    issued: Arc<RwLock<Option<IssuedToken>>>,
}

impl ServiceAccountAuthenticator {
    /// Read a service account key file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::new(credentials))
    }

    pub fn new(credentials: ServiceAccountCredentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            scope: DRIVE_SCOPE.to_string(),
            http: Client::new(),
            issued: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    fn token_uri(&self) -> &str {
        self.credentials.token_uri.as_deref().unwrap_or(TOKEN_URI)
    }

    fn claims(&self, now: OffsetDateTime) -> Claims {
        let iat = now.unix_timestamp();
        Claims {
            iss: self.credentials.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.token_uri().to_string(),
            iat,
            exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
        }
    }

    /// Sign a fresh assertion and exchange it for an access token.
    async fn fetch_token(&self) -> Result<IssuedToken> {
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        let jwt = encode(
            &Header::new(Algorithm::RS256),
            &self.claims(OffsetDateTime::now_utc()),
            &key,
        )?;

        debug!(client_email = %self.credentials.client_email, "requesting service account token");
        let response = self
            .http
            .post(self.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "service account grant returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = i64::try_from(token.expires_in).unwrap_or(i64::MAX);
        Ok(IssuedToken {
            access_token: token.access_token,
            expires_at: OffsetDateTime::now_utc().saturating_add(Duration::seconds(lifetime)),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuthenticator {
    async fn access_token(&self) -> Result<String> {
        let cached = self.issued.read().await.clone();
        if let Some(token) = cached {
            if token.expires_at > OffsetDateTime::now_utc() + Duration::seconds(60) {
                return Ok(token.access_token);
            }
        }

        let token = self.fetch_token().await?;
        *self.issued.write().await = Some(token.clone());
        Ok(token.access_token)
    }
}
