use clap::Parser;
use frontdesk::utils::logger;
use frontdesk::{Cli, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // 初始化日誌
    logger::init_logger(config.logging.verbose, config.logging.json);

    tracing::info!("Starting frontdesk {}", env!("CARGO_PKG_VERSION"));
    if config.logging.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    // 建立並啟動伺服器
    let server = Server::builder().config(config).build()?;

    if let Err(e) = server.run().await {
        tracing::error!("❌ Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
