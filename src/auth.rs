use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const SESSION_COOKIE: &str = "certdesk_session";

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Upper bound on session lifetime; longer configured TTLs are clamped.
const MAX_SESSION_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// In-memory server-side sessions keyed by an opaque random token.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::try_seconds(
                i64::try_from(ttl_secs).map_or(MAX_SESSION_TTL_SECS, |s| s.min(MAX_SESSION_TTL_SECS)),
            )
            .unwrap_or_else(|| Duration::seconds(MAX_SESSION_TTL_SECS)),
        }
    }

    pub fn create(&self, username: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Returns the live session for `token`, dropping it if it has expired.
    pub fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.get(token)?.clone();
        if session.expires_at <= Utc::now() {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn destroy(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Remove expired sessions, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }
}

/// Constant-time comparison of submitted credentials against configured ones.
pub fn credentials_match(
    username: &str,
    password: &str,
    expected_user: &str,
    expected_pass: &str,
) -> bool {
    let user_ok = username.as_bytes().ct_eq(expected_user.as_bytes());
    let pass_ok = password.as_bytes().ct_eq(expected_pass.as_bytes());
    bool::from(user_ok & pass_ok)
}

/// Extract the session token from the `Cookie` header(s).
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

pub fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Rejects requests without a live session when authentication is enabled.
#[derive(Clone)]
pub struct SessionLayer {
    pub store: Arc<SessionStore>,
    pub enabled: bool,
}

impl SessionLayer {
    pub fn new(store: Arc<SessionStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }
}

impl<S> tower::Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: self.store.clone(),
            enabled: self.enabled,
        }
    }
}

#[derive(Clone)]
pub struct SessionService<S> {
    inner: S,
    store: Arc<SessionStore>,
    enabled: bool,
}

impl<S, B> tower::Service<axum::http::Request<B>> for SessionService<S>
where
    S: tower::Service<axum::http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: axum::http::Request<B>) -> Self::Future {
        let store = self.store.clone();
        let enabled = self.enabled;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if enabled {
                let authenticated = session_token(req.headers())
                    .and_then(|token| store.get(&token))
                    .is_some();

                if !authenticated {
                    let body = json!({
                        "data": null,
                        "error": {
                            "code": 401,
                            "message": "Authentication required",
                            "redirect_to": "/login",
                        }
                    });
                    return Ok((StatusCode::UNAUTHORIZED, axum::Json(body)).into_response());
                }
            }

            inner.call(req).await
        })
    }
}
