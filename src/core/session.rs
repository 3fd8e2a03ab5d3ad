//! Cookie-identified server-side sessions.
//!
//! The cookie carries only a random id; the state lives in a [`SessionStore`].
//! A fresh session that is never written to is neither stored nor announced
//! with a cookie.

use crate::config::{CookieSecurity, SameSitePolicy, SessionConfig, SessionCookieKind};
use crate::domain::model::{ClientInfo, SessionRecord};
use crate::domain::ports::SessionStore;
use crate::utils::error::{AppError, Result};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use biscotti::{Processor, ProcessorConfig, RequestCookies, ResponseCookie, ResponseCookies, SameSite};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default)]
struct SessionInner {
    id: Option<String>,
    data: HashMap<String, serde_json::Value>,
    modified: bool,
    regenerate: bool,
    destroyed: bool,
}

/// Handle to the current request's session. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    fn fresh() -> Self {
        Self::default()
    }

    fn existing(id: String, data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                id: Some(id),
                data,
                ..SessionInner::default()
            })),
        }
    }

    /// The id the client presented, or `None` for a session not yet saved.
    pub fn id(&self) -> Option<String> {
        self.inner.lock().id.clone()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let inner = self.inner.lock();
        match inner.data.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn insert<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.inner.lock();
        inner.data.insert(key.into(), value);
        inner.modified = true;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock();
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.modified = true;
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if !inner.data.is_empty() {
            inner.data.clear();
            inner.modified = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    /// Keeps the data but moves it to a new id when the response is sent.
    /// Call after a privilege change such as login.
    pub fn regenerate(&self) {
        let mut inner = self.inner.lock();
        inner.regenerate = true;
        inner.modified = true;
    }

    /// Deletes the session from the store and expires the cookie.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        inner.data.clear();
        inner.destroyed = true;
    }

    fn take(&self) -> SessionInner {
        std::mem::take(&mut *self.inner.lock())
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::SessionError {
                message: "Session requested but session_middleware is not installed".to_string(),
            })
    }
}

/// Loads sessions before the handler runs and persists them afterwards.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
    processor: Arc<Processor>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            processor: Arc::new(ProcessorConfig::default().into()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Looks up the session named by the request's cookie, falling back to a
    /// fresh one when the cookie is missing, malformed or stale.
    pub async fn load(&self, headers: &HeaderMap) -> Result<Session> {
        let Some(id) = self.session_id_from(headers) else {
            return Ok(Session::fresh());
        };

        match self.store.load(&id).await? {
            Some(record) => Ok(Session::existing(id, record.data)),
            None => {
                tracing::debug!("Unknown or expired session id, starting a new session");
                Ok(Session::fresh())
            }
        }
    }

    fn session_id_from(&self, headers: &HeaderMap) -> Option<String> {
        let values = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>();
        if values.is_empty() {
            return None;
        }

        let cookies = match RequestCookies::parse_headers(values.into_iter(), &self.processor) {
            Ok(cookies) => cookies,
            Err(e) => {
                tracing::warn!("Ignoring malformed Cookie header: {}", e);
                return None;
            }
        };

        let value = cookies.get(&self.config.cookie.name)?.value().to_string();
        // Only ids we could have issued are looked up.
        Uuid::parse_str(&value).ok().map(|_| value)
    }

    /// Persists the session and appends the matching `Set-Cookie` header.
    pub async fn commit(
        &self,
        session: &Session,
        client: Option<&ClientInfo>,
        response: &mut Response,
    ) -> Result<()> {
        let state = session.take();

        if state.destroyed {
            if let Some(id) = state.id {
                self.store.delete(&id).await?;
                tracing::debug!("Destroyed session {}", id);
                self.append_cookie(response, self.removal_cookie())?;
            }
            return Ok(());
        }

        let is_new = state.id.is_none();
        if !state.modified && (is_new || !self.config.rolling) {
            return Ok(());
        }

        let secure = self.cookie_secure(client);
        if self.config.cookie.secure == CookieSecurity::Always && !secure {
            tracing::debug!("Not saving session: secure cookie required but request is not HTTPS");
            return Ok(());
        }

        let expires_at = self.expiry_from_now()?;

        let id = match (state.id, state.regenerate) {
            (Some(old_id), true) => {
                self.store.delete(&old_id).await?;
                new_session_id()
            }
            (Some(id), false) => id,
            (None, _) => new_session_id(),
        };

        let record = SessionRecord {
            data: state.data,
            expires_at,
        };
        self.store.store(&id, record).await?;

        let cookie = self.session_cookie(id, secure);
        self.append_cookie(response, cookie)
    }

    fn expiry_from_now(&self) -> Result<DateTime<Utc>> {
        i64::try_from(self.config.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| AppError::SessionError {
                message: format!(
                    "Session TTL of {} seconds is out of range",
                    self.config.ttl_seconds
                ),
            })
    }

    fn cookie_secure(&self, client: Option<&ClientInfo>) -> bool {
        match self.config.cookie.secure {
            CookieSecurity::Never => false,
            CookieSecurity::Auto | CookieSecurity::Always => {
                client.map(ClientInfo::is_secure).unwrap_or(false)
            }
        }
    }

    fn session_cookie(&self, id: String, secure: bool) -> ResponseCookie<'static> {
        let cookie_config = &self.config.cookie;
        let mut cookie = self.base_cookie(id);

        if secure {
            cookie = cookie.set_secure(true);
        }
        if cookie_config.kind == SessionCookieKind::Persistent {
            let seconds = i64::try_from(self.config.ttl_seconds).unwrap_or(i64::MAX);
            cookie = cookie.set_max_age(time::Duration::seconds(seconds));
        }
        cookie
    }

    fn removal_cookie(&self) -> ResponseCookie<'static> {
        self.base_cookie(String::new()).set_max_age(time::Duration::ZERO)
    }

    fn base_cookie(&self, value: String) -> ResponseCookie<'static> {
        let cookie_config = &self.config.cookie;
        let mut cookie = ResponseCookie::new(cookie_config.name.clone(), value)
            .set_path(cookie_config.path.clone())
            .set_same_site(same_site(cookie_config.same_site));

        if let Some(domain) = cookie_config.domain.as_deref() {
            cookie = cookie.set_domain(domain.to_owned());
        }
        if cookie_config.http_only {
            cookie = cookie.set_http_only(true);
        }
        // Browsers drop SameSite=None cookies that are not Secure.
        if cookie_config.same_site == SameSitePolicy::None {
            cookie = cookie.set_secure(true);
        }
        cookie
    }

    fn append_cookie(&self, response: &mut Response, cookie: ResponseCookie<'static>) -> Result<()> {
        let mut cookies = ResponseCookies::new();
        cookies.insert(cookie);

        for value in cookies.header_values(&self.processor) {
            let value = HeaderValue::from_str(&value).map_err(|e| AppError::SessionError {
                message: format!("Invalid Set-Cookie value: {}", e),
            })?;
            response.headers_mut().append(SET_COOKIE, value);
        }
        Ok(())
    }
}

fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub async fn session_middleware(
    State(sessions): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match sessions.load(request.headers()).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    let client = request.extensions().get::<ClientInfo>().cloned();
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if let Err(e) = sessions.commit(&session, client.as_ref(), &mut response).await {
        return e.into_response();
    }
    response
}
