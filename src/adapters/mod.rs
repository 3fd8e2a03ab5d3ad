// Adapters 層：外部系統的具體實作

pub mod http;
pub mod memory_store;
