use crate::config::{AppConfig, TrustProxy};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "frontdesk")]
#[command(about = "Web server scaffold with sessions, in-memory uploads and CORS")]
#[command(version)]
pub struct Cli {
    #[arg(long, short, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Address to bind to")]
    pub address: Option<IpAddr>,

    #[arg(long, short, help = "Port to listen on")]
    pub port: Option<u16>,

    #[arg(long, help = "Trusted proxy hops: 'true', 'false' or a number")]
    pub trust_proxy: Option<TrustProxy>,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl Cli {
    /// 載入配置檔 (或預設值)，套用命令列覆寫後驗證
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(address) = self.address {
            config.server.address = address;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(trust_proxy) = self.trust_proxy {
            config.server.trust_proxy = trust_proxy;
        }
        if self.verbose {
            config.logging.verbose = true;
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}
