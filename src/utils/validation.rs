use crate::utils::error::{AppError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> AppError {
    AppError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(field_name, url_str, format!("Invalid URL format: {}", e))),
    }
}

/// An origin is a scheme, host and optional port, nothing else. Browsers send
/// it without a trailing slash, so a configured `https://app.example.com/`
/// would never match.
pub fn validate_origin(field_name: &str, origin: &str) -> Result<()> {
    validate_url(field_name, origin)?;

    if origin.ends_with('/') {
        return Err(invalid(field_name, origin, "Origin must not end with '/'"));
    }

    let url = Url::parse(origin).map_err(|e| invalid(field_name, origin, e.to_string()))?;
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid(
            field_name,
            origin,
            "Origin must not contain a path, query or fragment",
        ));
    }
    if url.host_str().is_none() {
        return Err(invalid(field_name, origin, "Origin must have a host"));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_number_range(field_name: &str, value: u64, min_value: u64, max_value: u64) -> Result<()> {
    validate_positive_number(field_name, value, min_value)?;
    if value > max_value {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be at most {}", max_value),
        ));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

/// Cookie 名稱必須是 RFC 6265 token
pub fn validate_cookie_name(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;

    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || "()<>@,;:\\\"/[]?={}".contains(*c))
    {
        return Err(invalid(
            field_name,
            value,
            format!("Cookie name contains forbidden character {:?}", c),
        ));
    }
    Ok(())
}
