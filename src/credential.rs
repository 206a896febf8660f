//! The persisted user credential and its on-disk token file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::error::{DriveError, Result};
use crate::models::{ClientSecrets, TokenResponse};

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// A token this close to its expiry is treated as already expired.
const EXPIRY_BUFFER: Duration = Duration::seconds(60);

/// Bearer token plus everything needed to refresh it.
///
/// The JSON layout is the `authorized_user` token file written by Google's
/// client libraries, so existing `token.json` files keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, with = "rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<OffsetDateTime>,
}

fn default_token_uri() -> String {
    TOKEN_URI.to_string()
}

impl Credential {
    /// Build a credential from a fresh token response of the login flow.
    pub fn from_token_response(
        token: TokenResponse,
        secrets: &ClientSecrets,
        scope: &str,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            token: token.access_token,
            refresh_token: token.refresh_token,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: token
                .scope
                .as_deref()
                .map(split_scopes)
                .unwrap_or_else(|| split_scopes(scope)),
            expiry: Some(now + Duration::seconds(token.expires_in as i64)),
        }
    }

    /// A credential without an expiry never expires.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now + EXPIRY_BUFFER)
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh(&self, http: &Client) -> Result<Credential> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or_else(|| DriveError::TokenRefreshError("no refresh token".to_string()))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        debug!(token_uri = %self.token_uri, "refreshing access token");
        let response = http.post(&self.token_uri).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(self.renewed(token, OffsetDateTime::now_utc()))
    }

    /// Apply a refresh response; Google omits the refresh token on refresh.
    fn renewed(&self, token: TokenResponse, now: OffsetDateTime) -> Credential {
        Credential {
            token: token.access_token,
            refresh_token: token.refresh_token.or_else(|| self.refresh_token.clone()),
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: token
                .scope
                .as_deref()
                .map(split_scopes)
                .unwrap_or_else(|| self.scopes.clone()),
            expiry: Some(now + Duration::seconds(token.expires_in as i64)),
        }
    }
}

fn split_scopes(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// The token file on local disk.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted credential, `None` when no token file exists.
    pub fn load(&self) -> Result<Option<Credential>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        let content = serde_json::to_string_pretty(credential)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

mod rfc3339_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => {
                let formatted = dt.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&formatted)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom))
            .transpose()
    }
}
