use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::profile::SessionProfile;
use crate::registration::{Registrar, check_credential};
use crate::types::{ApplicationToken, Credential};

const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// MedicSense backend configuration.
///
/// The base URL is the only required value.
///
/// ```rust,ignore
/// use medicsense_session::BackendConfig;
///
/// let config = BackendConfig::new("https://api.medicsense.example/api/".parse()?)
///     .with_request_timeout(std::time::Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BackendConfig {
    pub(crate) base_url: Url,
    pub(crate) registration_path: String,
    pub(crate) logout_path: String,
    pub(crate) request_timeout: Duration,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            registration_path: "auth/provider".into(),
            logout_path: "auth/logout".into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `MEDICSENSE_API_BASE_URL`: backend API root, e.g. `http://localhost:5000/api`
    ///
    /// # Optional env vars
    /// - `MEDICSENSE_REGISTRATION_PATH`: override `auth/provider`
    /// - `MEDICSENSE_LOGOUT_PATH`: override `auth/logout`
    /// - `MEDICSENSE_REQUEST_TIMEOUT_MS`: per-request timeout in milliseconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base = std::env::var("MEDICSENSE_API_BASE_URL")
            .map_err(|_| Error::Config("MEDICSENSE_API_BASE_URL is required".into()))?;
        let base_url: Url = base
            .parse()
            .map_err(|e| Error::Config(format!("MEDICSENSE_API_BASE_URL: {e}")))?;

        let mut config = Self::new(base_url);
        if let Ok(path) = std::env::var("MEDICSENSE_REGISTRATION_PATH") {
            config = config.with_registration_path(path);
        }
        if let Ok(path) = std::env::var("MEDICSENSE_LOGOUT_PATH") {
            config = config.with_logout_path(path);
        }
        if let Some(timeout) = crate::session::config::duration_ms_env("MEDICSENSE_REQUEST_TIMEOUT_MS")? {
            config = config.with_request_timeout(timeout);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_registration_path(mut self, path: impl Into<String>) -> Self {
        self.registration_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Registration endpoint (`POST`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path cannot be joined onto the base URL.
    pub fn registration_url(&self) -> Result<Url, Error> {
        self.endpoint(&self.registration_path)
    }

    /// Logout endpoint (`POST`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path cannot be joined onto the base URL.
    pub fn logout_url(&self) -> Result<Url, Error> {
        self.endpoint(&self.logout_path)
    }

    /// Joins `path` below the base URL, whether or not the base ends in `/`.
    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("endpoint {path}: {e}")))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.parse().expect("valid default URL"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationRequest<'a> {
    subject_id: &'a str,
    email: Option<&'a str>,
    display_name: Option<&'a str>,
    credential: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the MedicSense backend's provider-login endpoints.
pub struct BackendClient {
    config: BackendConfig,
    http: reqwest::Client,
}

impl BackendClient {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn try_register(
        &self,
        profile: &SessionProfile,
        credential: &Credential,
    ) -> Result<ApplicationToken, Error> {
        check_credential(credential)?;

        let body = RegistrationRequest {
            subject_id: profile.subject_id.as_str(),
            email: profile.email.as_deref(),
            display_name: profile.display_name.as_deref(),
            credential: credential.as_str(),
        };

        let response = self
            .http
            .post(self.config.registration_url()?)
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed = serde_json::from_str::<RegistrationResponse>(&text).ok();

        if !status.is_success() {
            return Err(Error::RegistrationFailed {
                detail: format!("backend returned HTTP {}", status.as_u16()),
                message: parsed.and_then(|r| r.message),
            });
        }

        let parsed = parsed.ok_or_else(|| Error::registration("malformed response body"))?;
        if !parsed.success {
            return Err(Error::RegistrationFailed {
                detail: "backend rejected registration".into(),
                message: parsed.message,
            });
        }

        parsed
            .token
            .and_then(ApplicationToken::parse)
            .ok_or_else(|| Error::registration("response is missing the token field"))
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Backend(format!("{operation} returned HTTP {status}: {body}")))
    }
}

impl Registrar for BackendClient {
    async fn register(
        &self,
        profile: &SessionProfile,
        credential: &Credential,
    ) -> Result<ApplicationToken, Error> {
        self.try_register(profile, credential).await.map_err(|e| {
            tracing::debug!(subject = %profile.subject_id, error = %e, "Backend registration failed");
            e.into_registration_failure()
        })
    }

    async fn release(&self, token: &ApplicationToken) -> Result<(), Error> {
        let response = self
            .http
            .post(self.config.logout_url()?)
            .timeout(self.config.request_timeout)
            .bearer_auth(token.as_str())
            .send()
            .await?;
        Self::ensure_success(response, "backend logout").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn profile() -> SessionProfile {
        SessionProfile::new("uid-1".parse().unwrap())
            .with_email("ada@example.com")
            .with_display_name("Ada")
    }

    async fn client_for(server: &MockServer) -> BackendClient {
        let base: Url = format!("{}/api", server.uri()).parse().unwrap();
        BackendClient::new(BackendConfig::new(base).with_request_timeout(Duration::from_millis(500)))
    }

    fn failure(result: Result<ApplicationToken, Error>) -> (String, Option<String>) {
        match result {
            Err(Error::RegistrationFailed { detail, message }) => (detail, message),
            other => panic!("expected RegistrationFailed, got {other:?}"),
        }
    }

    #[test]
    fn endpoints_join_with_or_without_trailing_slash() {
        let with_slash = BackendConfig::new("http://h/api/".parse().unwrap());
        let without = BackendConfig::new("http://h/api".parse().unwrap());
        assert_eq!(with_slash.registration_url().unwrap().as_str(), "http://h/api/auth/provider");
        assert_eq!(without.registration_url().unwrap().as_str(), "http://h/api/auth/provider");
        assert_eq!(
            without.with_logout_path("/session/end").logout_url().unwrap().as_str(),
            "http://h/api/session/end"
        );
    }

    #[test]
    fn default_points_at_local_backend() {
        let config = BackendConfig::default();
        assert_eq!(config.base_url().as_str(), "http://localhost:5000/api/");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn register_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/provider"))
            .and(body_json(serde_json::json!({
                "subjectId": "uid-1",
                "email": "ada@example.com",
                "displayName": "Ada",
                "credential": "id-token",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "token": "app-token"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server)
            .await
            .register(&profile(), &Credential::new("id-token"))
            .await
            .unwrap();
        assert_eq!(token.as_str(), "app-token");
    }

    #[tokio::test]
    async fn success_false_carries_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/provider"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"success": false, "message": "quota exceeded"}),
            ))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .register(&profile(), &Credential::new("id-token"))
            .await;
        let (_, message) = failure(result);
        assert_eq!(message.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn non_success_status_is_registration_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "success": false,
                "message": "An account with this email already exists."
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .register(&profile(), &Credential::new("id-token"))
            .await;
        let (detail, message) = failure(result);
        assert!(detail.contains("409"));
        assert_eq!(message.as_deref(), Some("An account with this email already exists."));
    }

    #[tokio::test]
    async fn missing_token_is_registration_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .register(&profile(), &Credential::new("id-token"))
            .await;
        let (detail, message) = failure(result);
        assert!(detail.contains("token"));
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_registration_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .register(&profile(), &Credential::new("id-token"))
            .await;
        let (detail, _) = failure(result);
        assert!(detail.contains("malformed"));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "token": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .register(&profile(), &Credential::new("id-token"))
            .await;
        failure(result);
    }

    #[tokio::test]
    async fn expired_credential_never_reaches_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let expired = Credential::new("id-token")
            .with_expiry(time::OffsetDateTime::now_utc() - time::Duration::minutes(1));
        let result = client_for(&server).await.register(&profile(), &expired).await;
        let (detail, _) = failure(result);
        assert!(detail.contains("expired"));
    }

    #[tokio::test]
    async fn release_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .and(header("authorization", "Bearer app-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .release(&ApplicationToken::parse("app-token").unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn release_reports_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .release(&ApplicationToken::parse("app-token").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)), "unexpected: {err:?}");
        assert!(err.to_string().starts_with("Backend error"));
        assert!(err.to_string().contains("500"));
    }
}
