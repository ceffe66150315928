// ===============================
// src/client.rs (authenticated request flow)
// ===============================
//
// Semua request ke backend lewat sini:
// - 2xx            -> body dikembalikan apa adanya
// - 401 (sekali)   -> refresh session diam-diam, lalu replay request yang sama
// - 401 login/replay -> dikembalikan ke caller (halaman login tampilkan pesan)
// - 422            -> dikembalikan ke caller (error per field)
// - lainnya        -> navigasi ke halaman login
//
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::forms::FieldErrors;
use crate::metrics::{status_class, AUTH_REFRESH, HTTP_RESPONSES, LOGIN_REDIRECTS, REPLAYS};

pub const LOGIN_PATH: &str = "/api/inventory/login/";
pub const REFRESH_PATH: &str = "/api/inventory/retry/";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {path}")]
    AuthExpired { path: String },
    #[error("validation failed: {0}")]
    ValidationFailed(FieldErrors),
    #[error("request failed with status {status}, redirected to login")]
    RedirectedToLogin { status: u16 },
    #[error("request to {path} timed out")]
    TimedOut { path: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("bad response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(Value),
    Multipart { field: String, file_name: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Overrides the default `application/json`.
    pub content_type: Option<String>,
    pub with_credentials: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { content_type: None, with_credentials: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Initial,
    Sent,
    Success,
    FailedNoRetry,
    FailedRetryOneShot,
    Retrying,
    FailedTerminal,
}

/// One logical request. The retry flag lives here, never on shared config.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    pub method: Method,
    pub path: String,
    pub payload: Payload,
    pub options: RequestOptions,
    retried: bool,
    state: AttemptState,
}

impl RequestAttempt {
    pub fn new(method: Method, path: &str, payload: Payload, options: RequestOptions) -> Self {
        Self { method, path: path.to_string(), payload, options, retried: false, state: AttemptState::Initial }
    }

    pub fn retried(&self) -> bool {
        self.retried
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Header value to send. `None` for multipart: the transport writes the
    /// boundary-carrying `multipart/form-data` header itself.
    pub fn content_type(&self) -> Option<&str> {
        match (&self.payload, &self.options.content_type) {
            (Payload::Multipart { .. }, _) => None,
            (_, Some(ct)) => Some(ct.as_str()),
            (_, None) => Some("application/json"),
        }
    }

    fn fail(&mut self) {
        self.state = if self.retried { AttemptState::FailedTerminal } else { AttemptState::FailedNoRetry };
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, attempt: &RequestAttempt) -> Result<RawResponse, reqwest::Error>;
}

/// Side effect of an unrecoverable failure: leave the current page for login.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, target: &str);
}

enum Disposition {
    RetryOnce,
    Surface,
    Redirect,
}

pub struct AuthClient<T, N> {
    transport: T,
    navigator: N,
    login_page: String,
    deadline: Duration,
}

impl<T: Transport, N: Navigator> AuthClient<T, N> {
    pub fn new(transport: T, navigator: N, login_page: &str, deadline: Duration) -> Self {
        Self { transport, navigator, login_page: login_page.to_string(), deadline }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let mut attempt = RequestAttempt::new(method, path, payload, options);
        self.execute(&mut attempt).await
    }

    /// Drive `attempt` to a terminal state under the overall deadline.
    /// The deadline covers send, refresh and replay together.
    pub async fn execute(&self, attempt: &mut RequestAttempt) -> Result<Value, ApiError> {
        let outcome = timeout(self.deadline, self.drive(attempt)).await;
        let res = match outcome {
            Ok(res) => res,
            Err(_) => {
                warn!(path = %attempt.path, deadline_ms = self.deadline.as_millis() as u64, "request timed out");
                attempt.state = AttemptState::FailedTerminal;
                Err(ApiError::TimedOut { path: attempt.path.clone() })
            }
        };
        debug!(path = %attempt.path, state = ?attempt.state(), "attempt finished");
        res
    }

    async fn drive(&self, attempt: &mut RequestAttempt) -> Result<Value, ApiError> {
        attempt.state = AttemptState::Sent;
        loop {
            let rsp = match self.transport.send(attempt).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %attempt.path, ?e, "transport failure");
                    attempt.fail();
                    return Err(ApiError::Transport(e));
                }
            };
            let status = rsp.status.as_u16();
            HTTP_RESPONSES.with_label_values(&[status_class(status)]).inc();
            debug!(method = %attempt.method, path = %attempt.path, status, retried = attempt.retried, "response");

            if rsp.status.is_success() {
                attempt.state = AttemptState::Success;
                return decode_body(&rsp.body);
            }

            match self.disposition(attempt, rsp.status) {
                Disposition::RetryOnce => {
                    attempt.state = AttemptState::FailedRetryOneShot;
                    attempt.retried = true;
                    if !self.refresh().await {
                        attempt.state = AttemptState::FailedTerminal;
                        return Err(ApiError::AuthExpired { path: attempt.path.clone() });
                    }
                    info!(path = %attempt.path, "session refreshed, replaying request");
                    REPLAYS.inc();
                    attempt.state = AttemptState::Retrying;
                }
                Disposition::Surface => {
                    attempt.fail();
                    return Err(surface_error(attempt, &rsp));
                }
                Disposition::Redirect => {
                    attempt.fail();
                    warn!(path = %attempt.path, status, target = %self.login_page, "unexpected failure, leaving for login");
                    LOGIN_REDIRECTS.inc();
                    self.navigator.redirect_to_login(&self.login_page);
                    return Err(ApiError::RedirectedToLogin { status });
                }
            }
        }
    }

    fn disposition(&self, attempt: &RequestAttempt, status: StatusCode) -> Disposition {
        match status {
            StatusCode::UNAUTHORIZED if !attempt.retried && attempt.path != LOGIN_PATH => Disposition::RetryOnce,
            StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY => Disposition::Surface,
            _ => Disposition::Redirect,
        }
    }

    /// Refresh call goes straight to the transport: no interception, no redirect.
    async fn refresh(&self) -> bool {
        let mut attempt = RequestAttempt::new(
            Method::POST,
            REFRESH_PATH,
            Payload::Json(json!({ "refresh": "" })),
            RequestOptions::default(),
        );
        attempt.retried = true;
        match self.transport.send(&attempt).await {
            Ok(rsp) if rsp.status.is_success() => {
                AUTH_REFRESH.with_label_values(&["ok"]).inc();
                true
            }
            Ok(rsp) => {
                AUTH_REFRESH.with_label_values(&["rejected"]).inc();
                warn!(status = rsp.status.as_u16(), "session refresh rejected");
                false
            }
            Err(e) => {
                AUTH_REFRESH.with_label_values(&["error"]).inc();
                warn!(?e, "session refresh failed");
                false
            }
        }
    }
}

fn decode_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

fn surface_error(attempt: &RequestAttempt, rsp: &RawResponse) -> ApiError {
    if rsp.status == StatusCode::UNPROCESSABLE_ENTITY {
        let body = serde_json::from_slice::<Value>(&rsp.body).unwrap_or(Value::Null);
        ApiError::ValidationFailed(FieldErrors::from_body(&body))
    } else {
        ApiError::AuthExpired { path: attempt.path.clone() }
    }
}


#[cfg(test)]
mod tests {
    use super::testkit::*;
    use super::*;

    const PRODUCTS: &str = "/api/inventory/products/";

    fn get(path: &str) -> RequestAttempt {
        RequestAttempt::new(Method::GET, path, Payload::Empty, RequestOptions::default())
    }

    #[tokio::test]
    async fn success_returns_body_unchanged() {
        let c = client(&[(200, r#"[{"id":1,"name":"a"}]"#)]);
        let mut a = get(PRODUCTS);
        let v = c.execute(&mut a).await.unwrap();
        assert_eq!(v, json!([{"id": 1, "name": "a"}]));
        assert_eq!(a.state(), AttemptState::Success);
        assert!(!a.retried());
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn empty_success_body_is_null() {
        let c = client(&[(204, "")]);
        let v = c.request(Method::DELETE, "/api/inventory/products/3", Payload::Empty, RequestOptions::default());
        assert_eq!(v.await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn expired_session_refreshes_and_replays_once() {
        let body = r#"{"ok":true}"#;
        let c = client(&[(401, ""), (200, "{}"), (200, body)]);
        let payload = Payload::Json(json!({"name": "x"}));
        let mut a = RequestAttempt::new(Method::POST, PRODUCTS, payload.clone(), RequestOptions::default());

        let v = c.execute(&mut a).await.unwrap();
        assert_eq!(v, json!({"ok": true}));
        assert_eq!(a.state(), AttemptState::Success);
        assert!(a.retried());

        let calls = c.transport().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], (Method::POST, PRODUCTS.to_string(), false));
        assert_eq!(calls[1].1, REFRESH_PATH);
        assert_eq!(calls[2], (Method::POST, PRODUCTS.to_string(), true));

        let payloads = c.transport().payloads();
        assert_eq!(payloads[1], Payload::Json(json!({"refresh": ""})));
        assert_eq!(payloads[2], payload);
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn second_401_after_replay_is_not_retried_again() {
        let c = client(&[(401, ""), (200, "{}"), (401, "")]);
        let mut a = get(PRODUCTS);
        let err = c.execute(&mut a).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired { .. }));
        assert_eq!(a.state(), AttemptState::FailedTerminal);

        let refreshes = c.transport().calls().iter().filter(|c| c.1 == REFRESH_PATH).count();
        assert_eq!(refreshes, 1);
        assert_eq!(c.transport().calls().len(), 3);
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_original_401() {
        let c = client(&[(401, ""), (401, r#"{"detail":"refresh expired"}"#)]);
        let mut a = get(PRODUCTS);
        let err = c.execute(&mut a).await.unwrap_err();
        match err {
            ApiError::AuthExpired { path } => assert_eq!(path, PRODUCTS),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(a.state(), AttemptState::FailedTerminal);
        assert_eq!(c.transport().calls().len(), 2);
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn login_401_is_returned_without_refresh_or_redirect() {
        let c = client(&[(401, r#"{"detail":"bad credentials"}"#)]);
        let mut a = RequestAttempt::new(
            Method::POST,
            LOGIN_PATH,
            Payload::Json(json!({"username": "u", "password": "p"})),
            RequestOptions::default(),
        );
        let err = c.execute(&mut a).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired { .. }));
        assert_eq!(a.state(), AttemptState::FailedNoRetry);
        assert_eq!(c.transport().calls().len(), 1);
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn validation_failure_is_returned_untouched() {
        let c = client(&[(422, r#"{"quantity":["must be positive"]}"#)]);
        let mut a = get(PRODUCTS);
        match c.execute(&mut a).await.unwrap_err() {
            ApiError::ValidationFailed(errs) => {
                assert_eq!(errs.get("quantity").unwrap(), ["must be positive".to_string()])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(a.state(), AttemptState::FailedNoRetry);
        assert_eq!(c.transport().calls().len(), 1);
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn validation_failure_on_replay_is_returned_untouched() {
        let c = client(&[(401, ""), (200, "{}"), (422, "not json")]);
        let mut a = get(PRODUCTS);
        let err = c.execute(&mut a).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationFailed(_)));
        assert_eq!(c.transport().calls().len(), 3);
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn other_failures_redirect_exactly_once_without_retry() {
        for status in [500_u16, 404, 403, 400, 503] {
            let c = client(&[(status, "boom")]);
            let mut a = get(PRODUCTS);
            let err = c.execute(&mut a).await.unwrap_err();
            assert!(matches!(err, ApiError::RedirectedToLogin { status: s } if s == status));
            assert_eq!(c.transport().calls().len(), 1);
            assert_eq!(c.navigator().targets(), vec!["/login/".to_string()]);
        }
    }

    #[tokio::test]
    async fn server_error_on_replay_redirects() {
        let c = client(&[(401, ""), (200, "{}"), (500, "")]);
        let mut a = get(PRODUCTS);
        let err = c.execute(&mut a).await.unwrap_err();
        assert!(matches!(err, ApiError::RedirectedToLogin { status: 500 }));
        assert_eq!(a.state(), AttemptState::FailedTerminal);
        assert_eq!(c.navigator().targets().len(), 1);
    }

    #[tokio::test]
    async fn deadline_covers_the_whole_attempt() {
        let mut transport = ScriptedTransport::new(&[(200, "{}")]);
        transport.delay = Some(Duration::from_secs(5));
        let c = AuthClient::new(transport, RecordingNavigator::default(), "/login/", Duration::from_millis(50));
        let mut a = get(PRODUCTS);
        let err = c.execute(&mut a).await.unwrap_err();
        assert!(matches!(err, ApiError::TimedOut { .. }));
        assert_eq!(a.state(), AttemptState::FailedTerminal);
        assert!(c.navigator().targets().is_empty());
    }

    #[test]
    fn content_type_defaults_and_overrides() {
        let json_req = get(PRODUCTS);
        assert_eq!(json_req.content_type(), Some("application/json"));

        let upload = RequestAttempt::new(
            Method::POST,
            "/api/inventory/sync/",
            Payload::Multipart { field: "file".into(), file_name: "a.csv".into(), bytes: vec![1] },
            RequestOptions { content_type: Some("multipart/form-data".into()), with_credentials: true },
        );
        assert_eq!(upload.content_type(), None);

        let custom = RequestAttempt::new(
            Method::POST,
            PRODUCTS,
            Payload::Empty,
            RequestOptions { content_type: Some("text/plain".into()), with_credentials: true },
        );
        assert_eq!(custom.content_type(), Some("text/plain"));
    }
}
