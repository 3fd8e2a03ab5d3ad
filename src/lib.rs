pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::Cli;

pub use adapters::memory_store::MemorySessionStore;
pub use config::AppConfig;
pub use core::app::{router, router_with, AppState};
pub use core::server::{Server, ServerBuilder};
pub use core::session::Session;
pub use core::upload::MemoryUploads;
pub use domain::model::ClientInfo;
pub use utils::error::{AppError, Result};
