// ===============================
// src/transport.rs (reqwest + cookie session)
// ===============================
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    cookie::Jar,
    header::{CONTENT_TYPE, SET_COOKIE},
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::client::{Payload, RawResponse, RequestAttempt, Transport};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file format: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    cookies: Vec<String>,
}

/// Raw `Set-Cookie` values kept between runs, one per cookie name.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Vec<String>, SessionError> {
        match fs::read(&self.path) {
            Ok(raw) => Ok(serde_json::from_slice::<SessionFile>(&raw)?.cookies),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Newer values replace older ones with the same cookie name.
    pub fn merge(&self, received: &[String]) -> Result<(), SessionError> {
        let mut cookies = self.load()?;
        for raw in received {
            let name = cookie_name(raw);
            cookies.retain(|c| cookie_name(c) != name);
            cookies.push(raw.clone());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&SessionFile { cookies })?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn cookie_name(raw: &str) -> &str {
    raw.split(';').next().unwrap_or("").split('=').next().unwrap_or("").trim()
}

pub struct ReqwestTransport {
    base: String,
    http: reqwest::Client,
    // tanpa cookie, untuk request with_credentials = false
    anon: reqwest::Client,
    session: Option<SessionStore>,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration, session: Option<SessionStore>) -> Result<Self, SetupError> {
        let base_url = Url::parse(base_url)?;
        let jar = Arc::new(Jar::default());
        if let Some(store) = &session {
            let restored = store.load()?;
            debug!(count = restored.len(), "restoring session cookies");
            for raw in &restored {
                jar.add_cookie_str(raw, &base_url);
            }
        }

        let http = reqwest::Client::builder().cookie_provider(jar).timeout(timeout).build()?;
        let anon = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base: base_url.as_str().trim_end_matches('/').to_string(), http, anon, session })
    }

    // file io lewat blocking pool, bukan di worker async
    async fn remember(&self, received: Vec<String>) {
        let Some(store) = self.session.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || store.merge(&received)).await {
            Ok(Ok(())) => debug!("session cookies saved"),
            Ok(Err(e)) => warn!(?e, "could not persist session cookies"),
            Err(e) => warn!(?e, "session writer task failed"),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, attempt: &RequestAttempt) -> Result<RawResponse, reqwest::Error> {
        let client = if attempt.options.with_credentials { &self.http } else { &self.anon };
        let url = format!("{}{}", self.base, attempt.path);
        let mut req = client.request(attempt.method.clone(), url);
        if let Some(ct) = attempt.content_type() {
            req = req.header(CONTENT_TYPE, ct);
        }
        req = match &attempt.payload {
            Payload::Empty => req,
            Payload::Json(v) => req.body(v.to_string()),
            Payload::Multipart { field, file_name, bytes } => {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                req.multipart(Form::new().part(field.clone(), part))
            }
        };

        let rsp = req.send().await?;
        let status = rsp.status();
        let received: Vec<String> = rsp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if attempt.options.with_credentials && !received.is_empty() {
            self.remember(received).await;
        }
        let body = rsp.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testkit::RecordingNavigator;
    use crate::client::{ApiError, AuthClient, RequestOptions, LOGIN_PATH};
    use hyper::header::{HeaderValue, COOKIE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server};
    use reqwest::Method;
    use serde_json::json;
    use std::convert::Infallible;
    use std::net::SocketAddr;

    fn reply(status: u16, body: &str) -> Response<Body> {
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_cookie(mut rsp: Response<Body>, cookie: &str) -> Response<Body> {
        rsp.headers_mut().append(hyper::header::SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
        rsp
    }

    // Backend kecil: login -> cookie "stale", refresh -> cookie "fresh",
    // products hanya terbuka untuk cookie "fresh".
    async fn backend(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let header = |name: hyper::header::HeaderName| {
            req.headers().get(name).and_then(|v: &HeaderValue| v.to_str().ok()).unwrap_or("").to_string()
        };
        let cookie = header(COOKIE);
        let ctype = header(hyper::header::CONTENT_TYPE);
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let body = hyper::body::to_bytes(req.into_body()).await.unwrap_or_default();
        let body = String::from_utf8_lossy(&body).to_string();

        let rsp = match (method.as_str(), path.as_str()) {
            ("POST", "/api/inventory/login/") if ctype == "application/json" && body.contains("secret-pass") => {
                with_cookie(reply(200, "{}"), "access=stale; Path=/")
            }
            ("POST", "/api/inventory/login/") => reply(401, r#"{"detail":"bad credentials"}"#),
            ("POST", "/api/inventory/retry/") if cookie.contains("access=") => {
                with_cookie(reply(200, "{}"), "access=fresh; Path=/")
            }
            ("POST", "/api/inventory/retry/") => reply(401, ""),
            ("GET", "/api/inventory/products/") if cookie.contains("access=fresh") => {
                reply(200, r#"[{"id":1,"name":"Bolt","price":2.5,"description":""}]"#)
            }
            ("GET", "/api/inventory/products/") => reply(401, ""),
            ("POST", "/api/inventory/sync/") if ctype.starts_with("multipart/form-data; boundary=") => {
                reply(200, &json!({ "received": body.contains("a,b,c") }).to_string())
            }
            _ => reply(500, ""),
        };
        Ok(rsp)
    }

    fn spawn_backend() -> SocketAddr {
        let make = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(backend)) });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make);
        let addr = server.local_addr();
        tokio::spawn(server);
        addr
    }

    fn session_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("inventory-session-{}-{name}.json", std::process::id()))
    }

    fn client_for(addr: SocketAddr, store: Option<SessionStore>) -> AuthClient<ReqwestTransport, RecordingNavigator> {
        let transport = ReqwestTransport::new(&format!("http://{addr}"), Duration::from_secs(5), store).unwrap();
        AuthClient::new(transport, RecordingNavigator::default(), "/login/", Duration::from_secs(10))
    }

    #[tokio::test]
    async fn stale_session_is_refreshed_through_cookies() {
        let addr = spawn_backend();
        let store = SessionStore::new(session_path("refresh"));
        store.clear().unwrap();
        let c = client_for(addr, Some(store.clone()));

        let login = json!({"username": "alice", "password": "secret-pass"});
        c.request(Method::POST, LOGIN_PATH, Payload::Json(login), RequestOptions::default()).await.unwrap();

        let products = c
            .request(Method::GET, "/api/inventory/products/", Payload::Empty, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(products[0]["name"], "Bolt");
        assert!(c.navigator().targets().is_empty());

        let saved = store.load().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].starts_with("access=fresh"));
        store.clear().unwrap();
    }

    #[tokio::test]
    async fn saved_session_is_restored_on_start() {
        let addr = spawn_backend();
        let store = SessionStore::new(session_path("restore"));
        store.clear().unwrap();
        store.merge(&["access=fresh; Path=/".to_string()]).unwrap();

        let c = client_for(addr, Some(store.clone()));
        let products = c
            .request(Method::GET, "/api/inventory/products/", Payload::Empty, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(products.as_array().unwrap().len(), 1);
        store.clear().unwrap();
    }

    #[tokio::test]
    async fn wrong_password_is_reported_to_login() {
        let addr = spawn_backend();
        let c = client_for(addr, None);
        let login = json!({"username": "alice", "password": "nope-nope"});
        let err = c.request(Method::POST, LOGIN_PATH, Payload::Json(login), RequestOptions::default()).await;
        assert!(matches!(err, Err(ApiError::AuthExpired { .. })));
        assert!(c.navigator().targets().is_empty());
    }

    #[tokio::test]
    async fn anonymous_request_carries_no_cookie() {
        let addr = spawn_backend();
        let store = SessionStore::new(session_path("anon"));
        store.clear().unwrap();
        store.merge(&["access=fresh; Path=/".to_string()]).unwrap();
        let c = client_for(addr, Some(store.clone()));

        let opts = RequestOptions { with_credentials: false, ..RequestOptions::default() };
        let mut attempt = RequestAttempt::new(Method::GET, "/api/inventory/products/", Payload::Empty, opts);
        // 401 -> refresh (dengan cookie, 200) -> replay tanpa cookie -> 401 lagi
        let err = c.execute(&mut attempt).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired { .. }));
        store.clear().unwrap();
    }

    #[tokio::test]
    async fn upload_goes_out_as_multipart() {
        let addr = spawn_backend();
        let c = client_for(addr, None);
        let payload = Payload::Multipart { field: "file".into(), file_name: "sales.csv".into(), bytes: b"a,b,c\n".to_vec() };
        let v = c
            .request(Method::POST, "/api/inventory/sync/", payload, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(v["received"], true);
    }

    #[tokio::test]
    async fn server_error_navigates_to_login() {
        let addr = spawn_backend();
        let c = client_for(addr, None);
        let err = c
            .request(Method::GET, "/api/inventory/nowhere/", Payload::Empty, RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RedirectedToLogin { status: 500 }));
        assert_eq!(c.navigator().targets(), vec!["/login/".to_string()]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn received_cookies_are_saved_from_async_context() {
        let store = SessionStore::new(session_path("remember"));
        store.clear().unwrap();
        let transport = ReqwestTransport::new("http://127.0.0.1:1", Duration::from_secs(1), Some(store.clone())).unwrap();

        transport.remember(vec!["access=stale; Path=/".into()]).await;
        transport.remember(vec!["access=fresh; Path=/".into(), "csrf=x".into()]).await;

        let mut saved = store.load().unwrap();
        saved.sort();
        assert_eq!(saved, vec!["access=fresh; Path=/".to_string(), "csrf=x".to_string()]);
        store.clear().unwrap();
    }

    #[test]
    fn merge_replaces_by_cookie_name() {
        let store = SessionStore::new(session_path("merge"));
        store.clear().unwrap();
        store.merge(&["a=1; Path=/".into(), "b=2".into()]).unwrap();
        store.merge(&["a=3; HttpOnly".into()]).unwrap();
        let mut saved = store.load().unwrap();
        saved.sort();
        assert_eq!(saved, vec!["a=3; HttpOnly".to_string(), "b=2".to_string()]);
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
