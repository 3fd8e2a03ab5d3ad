#[cfg(feature = "cli")]
pub mod cli;

use crate::utils::error::{AppError, Result};
use crate::utils::validation::{
    validate_cookie_name, validate_non_empty_string, validate_number_range, validate_origin,
    validate_positive_number, Validate,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// 瀏覽器會把 cookie 的 `Max-Age` 截斷在 400 天
pub const MAX_SESSION_TTL_SECONDS: u64 = 400 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub session: SessionConfig,
    pub cors: CorsConfig,
    pub http_client: HttpClientConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub trust_proxy: TrustProxy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            trust_proxy: TrustProxy::default(),
        }
    }
}

/// 信任伺服器前方幾層反向代理
///
/// TOML 與命令列都接受 `false`、`true` 或層數
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrustProxy {
    Flag(bool),
    Hops(usize),
}

impl TrustProxy {
    pub fn hops(&self) -> usize {
        match self {
            TrustProxy::Flag(false) => 0,
            TrustProxy::Flag(true) => usize::MAX,
            TrustProxy::Hops(n) => *n,
        }
    }
}

impl Default for TrustProxy {
    fn default() -> Self {
        TrustProxy::Hops(1)
    }
}

impl FromStr for TrustProxy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "true" => Ok(TrustProxy::Flag(true)),
            "false" => Ok(TrustProxy::Flag(false)),
            other => other
                .parse::<usize>()
                .map(TrustProxy::Hops)
                .map_err(|_| format!("expected 'true', 'false' or a hop count, got '{}'", other)),
        }
    }
}

/// 記憶體內暫存 multipart 上傳時的限制
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size: u64,
    pub max_files: usize,
    pub max_fields: usize,
    pub max_field_size: u64,
    pub max_body_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * MIB,
            max_files: 10,
            max_fields: 100,
            max_field_size: 64 * KIB,
            max_body_size: 25 * MIB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie: SessionCookieConfig,
    pub ttl_seconds: u64,
    /// 每次請求都重新儲存 session，延長到期時間
    pub rolling: bool,
    pub purge_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: SessionCookieConfig::default(),
            ttl_seconds: 24 * 60 * 60,
            rolling: false,
            purge_interval_seconds: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCookieConfig {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub http_only: bool,
    pub same_site: SameSitePolicy,
    pub secure: CookieSecurity,
    pub kind: SessionCookieKind,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: "sid".to_string(),
            path: "/".to_string(),
            domain: None,
            http_only: true,
            same_site: SameSitePolicy::Lax,
            secure: CookieSecurity::Auto,
            kind: SessionCookieKind::Persistent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

/// When the session cookie carries the `Secure` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieSecurity {
    /// Secure whenever the request arrived over HTTPS, as seen through trusted proxies.
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionCookieKind {
    /// `Max-Age` set to the session TTL.
    Persistent,
    /// No `Max-Age`; the browser drops it when its own session ends.
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_credentials: true,
            max_age_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub user_agent: String,
    pub pool_idle_timeout_seconds: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
            user_agent: concat!("frontdesk/", env!("CARGO_PKG_VERSION")).to_string(),
            pool_idle_timeout_seconds: 90,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub json: bool,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| AppError::ConfigError {
            message: format!("Cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AppError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SESSION_COOKIE})，未設定的變數保留原文
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AppError::InternalError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.upload.validate()?;
        self.session.validate()?;
        self.cors.validate()?;
        self.http_client.validate()?;
        Ok(())
    }
}

impl Validate for UploadConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("upload.max_file_size", self.max_file_size, 1)?;
        validate_positive_number("upload.max_files", self.max_files as u64, 1)?;
        validate_positive_number("upload.max_fields", self.max_fields as u64, 1)?;
        validate_positive_number("upload.max_field_size", self.max_field_size, 1)?;
        validate_positive_number("upload.max_body_size", self.max_body_size, 1)?;

        // 單一檔案不可超過整體請求上限
        if self.max_file_size > self.max_body_size {
            return Err(AppError::InvalidConfigValueError {
                field: "upload.max_file_size".to_string(),
                value: self.max_file_size.to_string(),
                reason: format!(
                    "Cannot exceed upload.max_body_size ({})",
                    self.max_body_size
                ),
            });
        }
        Ok(())
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> Result<()> {
        validate_cookie_name("session.cookie.name", &self.cookie.name)?;
        validate_non_empty_string("session.cookie.path", &self.cookie.path)?;
        validate_number_range(
            "session.ttl_seconds",
            self.ttl_seconds,
            1,
            MAX_SESSION_TTL_SECONDS,
        )?;
        validate_positive_number(
            "session.purge_interval_seconds",
            self.purge_interval_seconds,
            1,
        )?;

        // 瀏覽器會拒絕沒有 Secure 的 SameSite=None cookie
        if self.cookie.same_site == SameSitePolicy::None
            && self.cookie.secure == CookieSecurity::Never
        {
            return Err(AppError::InvalidConfigValueError {
                field: "session.cookie.same_site".to_string(),
                value: "none".to_string(),
                reason: "SameSite=None requires session.cookie.secure to be 'auto' or 'always'"
                    .to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for CorsConfig {
    fn validate(&self) -> Result<()> {
        for origin in &self.allowed_origins {
            if origin == "*" {
                if self.allow_credentials {
                    return Err(AppError::InvalidConfigValueError {
                        field: "cors.allowed_origins".to_string(),
                        value: origin.clone(),
                        reason: "Wildcard origin cannot be combined with allow_credentials"
                            .to_string(),
                    });
                }
                continue;
            }
            // 驗證來源格式
            validate_origin("cors.allowed_origins", origin)?;
        }
        Ok(())
    }
}

impl Validate for HttpClientConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("http_client.timeout_seconds", self.timeout_seconds, 1)?;
        validate_positive_number(
            "http_client.connect_timeout_seconds",
            self.connect_timeout_seconds,
            1,
        )?;
        validate_positive_number(
            "http_client.pool_idle_timeout_seconds",
            self.pool_idle_timeout_seconds,
            1,
        )?;
        validate_non_empty_string("http_client.user_agent", &self.user_agent)?;
        Ok(())
    }
}
