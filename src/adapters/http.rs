use crate::config::HttpClientConfig;
use crate::utils::error::Result;
use reqwest::Client;
use std::time::Duration;

/// Builds the shared outbound client. `reqwest::Client` is reference counted,
/// so clones share one connection pool.
pub fn build_http_client(config: &HttpClientConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_seconds))
        .user_agent(config.user_agent.clone())
        .build()?;

    tracing::debug!(
        "HTTP client ready (timeout: {}s, user agent: {})",
        config.timeout_seconds,
        config.user_agent
    );
    Ok(client)
}
