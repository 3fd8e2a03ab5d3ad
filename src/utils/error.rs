use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Upload error: {message}")]
    UploadError { message: String },

    #[error("Upload limit exceeded: {message}")]
    PayloadTooLarge { message: String },

    #[error("Session error: {message}")]
    SessionError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UploadError { .. } => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::CsvError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::HttpClientError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            AppError::UploadError { .. } => "Invalid Upload",
            AppError::PayloadTooLarge { .. } => "Payload Too Large",
            AppError::CsvError(_) => "Invalid CSV",
            AppError::HttpClientError(_) => "Upstream Request Failed",
            _ => "Internal Server Error",
        }
    }
}

/// RFC 9457 problem details body.
#[derive(Debug, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            type_uri: format!("https://httpstatuses.io/{}", status.as_u16()),
            title: title.into(),
            status: status.as_u16(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let problem = Problem::new(status, self.title());

        // 伺服器端錯誤只記錄在日誌，不回傳細節給客戶端
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
            if status == StatusCode::BAD_GATEWAY {
                return problem.with_detail("An upstream service could not be reached").into_response();
            }
            return problem.with_detail("An unexpected error occurred").into_response();
        }

        tracing::debug!("Request rejected ({}): {}", status, self);
        problem.with_detail(self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        let err = AppError::UploadError {
            message: "bad boundary".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = AppError::PayloadTooLarge {
            message: "file too big".to_string(),
        };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        use http_body_util::BodyExt;

        let err = AppError::ConfigError {
            message: "database password is hunter2".to_string(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["title"], "Internal Server Error");
        assert_eq!(json["detail"], "An unexpected error occurred");
        assert!(!bytes.windows(7).any(|w| w == b"hunter2"));
    }

    #[test]
    fn test_problem_serialization() {
        let problem = Problem::new(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
            .with_detail("file 'a.csv' exceeds 10 bytes");
        let json = serde_json::to_value(&problem).unwrap();

        assert_eq!(json["type"], "https://httpstatuses.io/413");
        assert_eq!(json["status"], 413);
        assert_eq!(json["detail"], "file 'a.csv' exceeds 10 bytes");
    }
}
