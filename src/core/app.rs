use crate::adapters::http::build_http_client;
use crate::config::{AppConfig, UploadConfig};
use crate::core::cors::cors_layer;
use crate::core::health::health_handler;
use crate::core::proxy::client_info_middleware;
use crate::core::session::{session_middleware, SessionManager};
use crate::domain::ports::SessionStore;
use crate::utils::error::Result;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug)]
pub struct AppStateInner {
    pub config: AppConfig,
    pub sessions: SessionManager,
    pub http: reqwest::Client,
    pub cors: CorsLayer,
    pub started_at: Instant,
}

/// Shared application state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let http = build_http_client(&config.http_client)?;
        let cors = cors_layer(&config.cors)?;
        let sessions = SessionManager::new(store, config.session.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                sessions,
                http,
                cors,
                started_at: Instant::now(),
            }),
        })
    }
}

impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FromRef<AppState> for reqwest::Client {
    fn from_ref(state: &AppState) -> Self {
        state.inner.http.clone()
    }
}

impl FromRef<AppState> for UploadConfig {
    fn from_ref(state: &AppState) -> Self {
        state.inner.config.upload.clone()
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.inner.sessions.clone()
    }
}

pub fn router(state: AppState) -> Router {
    router_with(state, Router::new())
}

/// Mounts `routes` next to `/health` under the full middleware stack.
///
/// Layers, outermost first: tracing, CORS, body limit, client resolution,
/// sessions. Sessions sit inside client resolution so the cookie's `Secure`
/// flag can follow the forwarded protocol.
pub fn router_with(state: AppState, routes: Router<AppState>) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_body_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health_handler))
        .merge(routes)
        .layer(from_fn_with_state(state.sessions.clone(), session_middleware))
        .layer(from_fn_with_state(
            state.config.server.trust_proxy,
            client_info_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(state.cors.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
