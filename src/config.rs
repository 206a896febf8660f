//! Runtime configuration: where credentials live and which endpoints to call.

use std::path::PathBuf;

/// Google Drive API scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Settings shared by the authenticator and the client.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Persisted user credential.
    pub token_path: PathBuf,
    /// OAuth client identifier and secret, only read when a login is needed.
    pub client_secrets_path: PathBuf,
    pub scope: String,
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("token.json"),
            client_secrets_path: PathBuf::from("client_secrets.json"),
            scope: DRIVE_SCOPE.to_string(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
        }
    }
}

impl DriveConfig {
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_client_secrets_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_secrets_path = path.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Point the client at different API roots (tests, proxies).
    pub fn with_endpoints(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.upload_base = upload_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_working_directory_files() {
        let config = DriveConfig::default();
        assert_eq!(config.token_path, PathBuf::from("token.json"));
        assert_eq!(config.client_secrets_path, PathBuf::from("client_secrets.json"));
        assert_eq!(config.scope, DRIVE_SCOPE);
    }

    #[test]
    fn test_with_endpoints_strips_trailing_slash() {
        let config = DriveConfig::default().with_endpoints("http://127.0.0.1:1234/", "http://127.0.0.1:1234/upload/");
        assert_eq!(config.api_base, "http://127.0.0.1:1234");
        assert_eq!(config.upload_base, "http://127.0.0.1:1234/upload");
    }
}
