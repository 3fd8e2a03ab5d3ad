//! Multipart uploads buffered entirely in memory, plus CSV decoding of the
//! buffered files.

use crate::config::UploadConfig;
use crate::domain::model::{CsvTable, UploadedFile};
use crate::utils::error::{AppError, Result};
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRef, FromRequest, Multipart, Request};
use axum::http::StatusCode;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Every file part of a multipart request, held in memory. Text parts land
/// in `fields`; a repeated field name keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct MemoryUploads {
    pub files: Vec<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl MemoryUploads {
    pub fn file(&self, field_name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field_name)
    }

    pub fn files_for<'a>(&'a self, field_name: &'a str) -> impl Iterator<Item = &'a UploadedFile> {
        self.files.iter().filter(move |f| f.field_name == field_name)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl<S> FromRequest<S> for MemoryUploads
where
    S: Send + Sync,
    UploadConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let limits = UploadConfig::from_ref(state);
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| AppError::UploadError {
                message: rejection.body_text(),
            })?;

        collect_uploads(multipart, &limits).await
    }
}

pub async fn collect_uploads(mut multipart: Multipart, limits: &UploadConfig) -> Result<MemoryUploads> {
    let mut uploads = MemoryUploads::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            if uploads.files.len() >= limits.max_files {
                return Err(AppError::PayloadTooLarge {
                    message: format!("more than {} files uploaded", limits.max_files),
                });
            }

            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = read_limited(field, limits.max_file_size, || {
                format!(
                    "file '{}' in field '{}' exceeds {} bytes",
                    file_name.as_deref().unwrap_or_default(),
                    field_name,
                    limits.max_file_size
                )
            })
            .await?;

            tracing::debug!(
                "Buffered upload '{}' ({} bytes) from field '{}'",
                file_name.as_deref().unwrap_or_default(),
                data.len(),
                field_name
            );
            uploads.files.push(UploadedFile {
                field_name,
                file_name,
                content_type,
                data: data.freeze(),
            });
        } else {
            if uploads.fields.len() >= limits.max_fields {
                return Err(AppError::PayloadTooLarge {
                    message: format!("more than {} form fields", limits.max_fields),
                });
            }

            let data = read_limited(field, limits.max_field_size, || {
                format!("field '{}' exceeds {} bytes", field_name, limits.max_field_size)
            })
            .await?;
            let value = String::from_utf8(data.to_vec()).map_err(|_| AppError::UploadError {
                message: format!("field '{}' is not valid UTF-8", field_name),
            })?;
            uploads.fields.insert(field_name, value);
        }
    }

    Ok(uploads)
}

async fn read_limited(
    mut field: Field<'_>,
    limit: u64,
    describe: impl FnOnce() -> String,
) -> Result<BytesMut> {
    let mut buffer = BytesMut::new();

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if (buffer.len() + chunk.len()) as u64 > limit {
            return Err(AppError::PayloadTooLarge { message: describe() });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer)
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            message: err.body_text(),
        }
    } else {
        AppError::UploadError {
            message: err.body_text(),
        }
    }
}

impl UploadedFile {
    fn csv_reader(&self) -> csv::Reader<&[u8]> {
        let data = self.data.strip_prefix(UTF8_BOM).unwrap_or(&self.data[..]);
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(data)
    }

    /// Parses the file as CSV with a header row. Every row must have as many
    /// columns as the header.
    pub fn csv_table(&self) -> Result<CsvTable> {
        let mut reader = self.csv_reader();
        let headers = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(CsvTable { headers, rows })
    }

    /// Deserializes each row into `T`, matching columns to fields by header name.
    pub fn deserialize_csv<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut reader = self.csv_reader();
        let mut items = Vec::new();
        for item in reader.deserialize() {
            items.push(item?);
        }
        Ok(items)
    }
}
