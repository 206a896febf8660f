//! Interactive installed-app login through a loopback redirect.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::distributions::{Alphanumeric, DistString};
use reqwest::{Client, Url};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::credential::Credential;
use crate::error::{DriveError, Result};
use crate::models::{ClientSecrets, ClientSecretsFile, TokenResponse};

const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";

/// Obtains a brand new credential, usually by asking the user.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn login(&self, scope: &str) -> Result<Credential>;
}

/// OAuth installed-app flow: the consent page redirects to a one-shot HTTP
/// listener on an ephemeral localhost port.
pub struct LoopbackLogin {
    secrets_path: PathBuf,
    http: Client,
}

impl LoopbackLogin {
    /// The secrets file is only read when a login actually happens.
    pub fn new<P: AsRef<Path>>(secrets_path: P) -> Self {
        Self {
            secrets_path: secrets_path.as_ref().to_path_buf(),
            http: Client::new(),
        }
    }

    pub fn load_secrets(&self) -> Result<ClientSecrets> {
        let content = fs::read_to_string(&self.secrets_path)?;
        let file: ClientSecretsFile = serde_json::from_str(&content)?;
        Ok(file.into_secrets())
    }

    /// Bind the redirect listener and build the consent URL.
    pub async fn start(&self, secrets: &ClientSecrets, scope: &str) -> Result<PendingAuthorization> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://localhost:{}/", port);
        let state = Alphanumeric.sample_string(&mut rand::thread_rng(), 30);

        let authorize_url = Url::parse_with_params(
            &secrets.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", scope),
                ("state", state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| DriveError::LoginError(format!("invalid auth_uri: {}", e)))?;

        Ok(PendingAuthorization {
            listener,
            redirect_uri,
            state,
            authorize_url,
        })
    }

    /// Trade an authorization code for a credential.
    pub async fn exchange(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<Credential> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(&secrets.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::LoginError(format!(
                "code exchange returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(Credential::from_token_response(
            token,
            secrets,
            scope,
            OffsetDateTime::now_utc(),
        ))
    }
}

#[async_trait]
impl LoginFlow for LoopbackLogin {
    async fn login(&self, scope: &str) -> Result<Credential> {
        let secrets = self.load_secrets()?;
        let pending = self.start(&secrets, scope).await?;

        info!("waiting for authorization on {}", pending.redirect_uri());
        eprintln!(
            "Please visit this URL to authorize this application:\n{}",
            pending.authorize_url()
        );

        let redirect_uri = pending.redirect_uri().to_string();
        let code = pending.wait_for_code().await?;
        self.exchange(&secrets, &code, &redirect_uri, scope).await
    }
}

/// A consent URL handed to the user and the listener waiting for its redirect.
pub struct PendingAuthorization {
    listener: TcpListener,
    redirect_uri: String,
    state: String,
    authorize_url: Url,
}

impl PendingAuthorization {
    pub fn authorize_url(&self) -> &str {
        self.authorize_url.as_str()
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Serve requests until the OAuth redirect arrives, then return its code.
    pub async fn wait_for_code(self) -> Result<String> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            let (read_half, mut write_half) = stream.split();
            let mut reader = BufReader::new(read_half);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).await?;
            // Drain headers so the browser sees a clean response.
            loop {
                let mut header = String::new();
                let n = reader.read_line(&mut header).await?;
                if n == 0 || header == "\r\n" || header == "\n" {
                    break;
                }
            }

            let Some(params) = redirect_params(&request_line) else {
                debug!(%peer, "ignoring non-redirect request");
                write_half
                    .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await?;
                continue;
            };

            let outcome = match (params.error, params.code) {
                (Some(error), _) => Err(DriveError::LoginError(error)),
                _ if params.state.as_deref() != Some(self.state.as_str()) => Err(
                    DriveError::LoginError("state mismatch in redirect".to_string()),
                ),
                (None, Some(code)) => Ok(code),
                (None, None) => Err(DriveError::LoginError(
                    "redirect carried no code".to_string(),
                )),
            };

            let body = match &outcome {
                Ok(_) => SUCCESS_PAGE.to_string(),
                Err(e) => e.to_string(),
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            write_half.write_all(response.as_bytes()).await?;
            write_half.flush().await?;

            return outcome;
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Parse `GET /?code=..&state=.. HTTP/1.1`; `None` if it is not a redirect.
fn redirect_params(request_line: &str) -> Option<RedirectParams> {
    let target = request_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{}", target)).ok()?;

    let mut params = RedirectParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }

    if params.code.is_none() && params.error.is_none() {
        return None;
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_params_code() {
        let params = redirect_params("GET /?state=abc&code=4%2F0Ad&scope=x HTTP/1.1\r\n").unwrap();
        assert_eq!(params.code.as_deref(), Some("4/0Ad"));
        assert_eq!(params.state.as_deref(), Some("abc"));
        assert!(params.error.is_none());
    }

    #[test]
    fn test_redirect_params_error() {
        let params = redirect_params("GET /?error=access_denied&state=abc HTTP/1.1").unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
    }

    #[test]
    fn test_redirect_params_ignores_other_requests() {
        assert!(redirect_params("GET /favicon.ico HTTP/1.1").is_none());
        assert!(redirect_params("").is_none());
    }
}
