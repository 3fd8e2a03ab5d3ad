use crate::config::CorsConfig;
use crate::utils::error::{AppError, Result};
use axum::http::{HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};

/// Builds the CORS layer for a front-end hosted on another origin. With no
/// configured origins the layer adds no CORS headers at all.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    if config.allowed_origins.is_empty() {
        return Ok(CorsLayer::new());
    }

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .max_age(Duration::from_secs(config.max_age_seconds));

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        // tower-http panics on this combination at request time
        if config.allow_credentials {
            return Err(AppError::InvalidConfigValueError {
                field: "cors.allowed_origins".to_string(),
                value: "*".to_string(),
                reason: "Wildcard origin cannot be combined with allow_credentials".to_string(),
            });
        }
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| AppError::InvalidConfigValueError {
                field: "cors.allowed_origins".to_string(),
                value: origin.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!("CORS enabled for {} origin(s)", origins.len());
    Ok(layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(config.allow_credentials))
}
