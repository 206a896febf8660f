//! Tests for the user-credential bootstrap: token file, refresh and login fallback.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use time::{Duration, OffsetDateTime};

use drive_store::{Authenticator, Credential, DriveError, LoginFlow, TokenSource, TokenStore};

const SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Login flow that records calls instead of opening a browser.
struct FakeLogin {
    calls: AtomicUsize,
    token_file: PathBuf,
    token_file_present: AtomicBool,
    issued: Option<Credential>,
}

impl FakeLogin {
    fn new(token_file: PathBuf, issued: Option<Credential>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            token_file,
            token_file_present: AtomicBool::new(false),
            issued,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginFlow for FakeLogin {
    async fn login(&self, scope: &str) -> drive_store::Result<Credential> {
        assert_eq!(scope, SCOPE);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token_file_present
            .store(self.token_file.exists(), Ordering::SeqCst);
        self.issued
            .clone()
            .ok_or_else(|| DriveError::LoginError("user closed the consent page".to_string()))
    }
}

fn credential(server: &ServerGuard, token: &str, expires_in: i64, refresh: Option<&str>) -> Credential {
    Credential {
        token: token.to_string(),
        refresh_token: refresh.map(str::to_string),
        token_uri: format!("{}/token", server.url()),
        client_id: "client.apps.googleusercontent.com".to_string(),
        client_secret: "secret".to_string(),
        scopes: vec![SCOPE.to_string()],
        expiry: Some(OffsetDateTime::now_utc() + Duration::seconds(expires_in)),
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: TokenStore,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    Fixture { _dir: dir, store }
}

#[tokio::test]
async fn valid_token_file_skips_login() {
    let server = Server::new_async().await;
    let fx = fixture();
    fx.store.save(&credential(&server, "ya29.valid", 3600, Some("1//r"))).unwrap();

    let login = FakeLogin::new(fx.store.path().to_path_buf(), None);
    let auth = Authenticator::new(fx.store.clone(), login.clone(), SCOPE);

    assert_eq!(auth.access_token().await.unwrap(), "ya29.valid");
    assert_eq!(login.calls(), 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_in_place() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "1//r".into()),
            Matcher::UrlEncoded("client_id".into(), "client.apps.googleusercontent.com".into()),
        ]))
        .with_body(json!({"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let fx = fixture();
    fx.store.save(&credential(&server, "ya29.stale", -60, Some("1//r"))).unwrap();

    let login = FakeLogin::new(fx.store.path().to_path_buf(), None);
    let auth = Authenticator::new(fx.store.clone(), login.clone(), SCOPE);

    let credential = auth.bootstrap().await.unwrap();
    assert_eq!(credential.token, "ya29.fresh");

    let persisted = fx.store.load().unwrap().unwrap();
    assert_eq!(persisted.token, "ya29.fresh");
    assert_eq!(persisted.refresh_token.as_deref(), Some("1//r"));
    assert_eq!(login.calls(), 0);
    refresh.assert_async().await;
}

#[tokio::test]
async fn failed_refresh_deletes_token_and_logs_in_once() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(json!({"error": "invalid_grant"}).to_string())
        .create_async()
        .await;

    let fx = fixture();
    fx.store.save(&credential(&server, "ya29.stale", -60, Some("1//revoked"))).unwrap();

    let issued = credential(&server, "ya29.login", 3600, Some("1//new"));
    let login = FakeLogin::new(fx.store.path().to_path_buf(), Some(issued));
    let auth = Authenticator::new(fx.store.clone(), login.clone(), SCOPE);

    let credential = auth.bootstrap().await.unwrap();

    assert_eq!(credential.token, "ya29.login");
    assert_eq!(login.calls(), 1);
    assert!(!login.token_file_present.load(Ordering::SeqCst));
    assert_eq!(fx.store.load().unwrap().unwrap().token, "ya29.login");
}

#[tokio::test]
async fn failed_refresh_and_login_is_authentication_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(json!({"error": "invalid_grant"}).to_string())
        .create_async()
        .await;

    let fx = fixture();
    fx.store.save(&credential(&server, "ya29.stale", -60, Some("1//revoked"))).unwrap();

    let login = FakeLogin::new(fx.store.path().to_path_buf(), None);
    let auth = Authenticator::new(fx.store.clone(), login.clone(), SCOPE);

    let err = auth.bootstrap().await.unwrap_err();

    assert!(matches!(err, DriveError::AuthenticationFailed(_)));
    assert_eq!(login.calls(), 1);
    assert!(fx.store.load().unwrap().is_none());
}

#[tokio::test]
async fn expired_without_refresh_token_goes_straight_to_login() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/token")
        .expect(0)
        .create_async()
        .await;

    let fx = fixture();
    fx.store.save(&credential(&server, "ya29.stale", -60, None)).unwrap();

    let issued = credential(&server, "ya29.login", 3600, Some("1//new"));
    let login = FakeLogin::new(fx.store.path().to_path_buf(), Some(issued));
    let auth = Authenticator::new(fx.store.clone(), login.clone(), SCOPE);

    assert_eq!(auth.bootstrap().await.unwrap().token, "ya29.login");
    assert_eq!(login.calls(), 1);
    refresh.assert_async().await;
}

#[tokio::test]
async fn missing_token_file_logs_in_and_caches() {
    let server = Server::new_async().await;
    let fx = fixture();

    let issued = credential(&server, "ya29.login", 3600, Some("1//new"));
    let login = FakeLogin::new(fx.store.path().to_path_buf(), Some(issued));
    let auth = Authenticator::new(fx.store.clone(), login.clone(), SCOPE);

    assert_eq!(auth.access_token().await.unwrap(), "ya29.login");
    assert_eq!(auth.access_token().await.unwrap(), "ya29.login");

    assert_eq!(login.calls(), 1);
    assert!(fx.store.path().exists());
}

mod service_account {
    use std::io::Write;

    use drive_store::models::ServiceAccountCredentials;
    use drive_store::ServiceAccountAuthenticator;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn credentials_from_json() {
        let creds: ServiceAccountCredentials = serde_json::from_value(json!({
            "client_email": "sa@project.iam.gserviceaccount.com",
            "private_key": "key",
            "token_uri": "https://oauth2.googleapis.com/token"
        }))
        .unwrap();

        assert_eq!(creds.client_email, "sa@project.iam.gserviceaccount.com");
        assert_eq!(creds.token_uri.as_deref(), Some("https://oauth2.googleapis.com/token"));
    }

    #[test]
    fn authenticator_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let creds_json = json!({
            "client_email": "sa@project.iam.gserviceaccount.com",
            "private_key": "key"
        });
        temp_file.write_all(creds_json.to_string().as_bytes()).unwrap();

        assert!(ServiceAccountAuthenticator::from_file(temp_file.path()).is_ok());
    }

    #[test]
    fn authenticator_from_invalid_file() {
        assert!(ServiceAccountAuthenticator::from_file("/nonexistent/path/credentials.json").is_err());

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();
        assert!(ServiceAccountAuthenticator::from_file(temp_file.path()).is_err());
    }

    #[tokio::test]
    async fn invalid_key_fails_before_any_request() {
        use drive_store::TokenSource;

        let auth = ServiceAccountAuthenticator::new(ServiceAccountCredentials {
            client_email: "sa@project.iam.gserviceaccount.com".to_string(),
            private_key: "not a pem key".to_string(),
            token_uri: Some("http://127.0.0.1:9/token".to_string()),
        });
        assert!(matches!(
            auth.access_token().await,
            Err(drive_store::DriveError::JwtError(_))
        ));
    }
}
