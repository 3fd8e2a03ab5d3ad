use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub data: HashMap<String, serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// The client as seen through the trusted part of the proxy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// `None` when the peer address is unknown.
    pub ip: Option<IpAddr>,
    pub protocol: Protocol,
    pub host: Option<String>,
    /// Every parsable address from the socket peer outwards, untrusted ones included.
    pub forwarded_chain: Vec<IpAddr>,
}

impl ClientInfo {
    pub fn is_secure(&self) -> bool {
        self.protocol == Protocol::Https
    }
}

/// A multipart file part buffered fully in memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}
