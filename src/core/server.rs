use crate::adapters::memory_store::MemorySessionStore;
use crate::config::AppConfig;
use crate::core::app::{router, AppState};
use crate::domain::ports::SessionStore;
use crate::utils::error::{AppError, Result};
use crate::utils::validation::Validate;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;

#[must_use = "builders do nothing unless you call .build()"]
#[derive(Default)]
pub struct ServerBuilder {
    config: AppConfig,
    store: Option<Arc<dyn SessionStore>>,
}

impl ServerBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`MemorySessionStore`].
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Server> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
        let state = AppState::new(self.config, store)?;
        Ok(Server { state })
    }
}

#[must_use = "call .run().await to start the server"]
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Binds the configured address and serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let server = &self.state.config.server;
        let address = SocketAddr::new(server.address, server.port);
        let listener = TcpListener::bind(address).await?;

        self.serve(listener, async {
            if let Err(e) = shutdown_signal().await {
                tracing::error!("Error while waiting for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
        })
        .await
    }

    /// Serves on an already bound listener until `shutdown` resolves, then
    /// drains in-flight requests.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = listener.local_addr()?;
        let config = &self.state.config;
        tracing::info!(
            "Starting HTTP server on http://{} (trusted proxy hops: {:?}, CORS origins: {})",
            address,
            config.server.trust_proxy,
            config.cors.allowed_origins.len()
        );

        let purge_task = spawn_session_purge(&self.state);
        let app = router(self.state.clone());

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        let purge_result = if purge_task.is_finished() {
            Some(purge_task.await)
        } else {
            purge_task.abort();
            None
        };
        result?;

        // The purge loop only ends by panicking.
        if let Some(Err(e)) = purge_result {
            return Err(AppError::InternalError {
                message: format!("Session purge task stopped: {}", e),
            });
        }

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

fn spawn_session_purge(state: &AppState) -> JoinHandle<()> {
    let store = state.sessions.store().clone();
    let period = Duration::from_secs(state.sessions.config().purge_interval_seconds);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!("Purged {} expired sessions", purged),
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
        }
    })
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<_, std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        res = ctrl_c => res,
        res = terminate => res,
    }
}
