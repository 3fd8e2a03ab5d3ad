pub mod app;
pub mod cors;
pub mod health;
pub mod proxy;
pub mod server;
pub mod session;
pub mod upload;

pub use crate::domain::model::{ClientInfo, CsvTable, Protocol, SessionRecord, UploadedFile};
pub use crate::domain::ports::SessionStore;
pub use crate::utils::error::Result;
