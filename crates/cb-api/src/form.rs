//! Multipart form reading shared by the upload endpoints.

use std::collections::HashMap;

use actix_multipart::Multipart;
use cb_core::error::AppError;
use cb_core::models::ImageUpload;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::StreamExt;

use crate::error::{invalid, ApiError};

/// Name of the file field carrying an image.
pub const IMAGE_FIELD: &str = "image";

/// Allowance for the text fields on top of one full-size image.
pub const TEXT_FIELDS_BUDGET: usize = 64 * 1024;

/// Text fields plus at most one image from a `multipart/form-data` body.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    pub image: Option<ImageUpload>,
}

impl FormData {
    /// Drains the payload. Any single field larger than `max_bytes`, or a body
    /// larger than `max_bytes + TEXT_FIELDS_BUDGET`, aborts the read.
    pub async fn read(mut payload: Multipart, max_bytes: usize) -> Result<Self, ApiError> {
        let mut form = FormData::default();
        let max_total = max_bytes.saturating_add(TEXT_FIELDS_BUDGET);
        let mut total = 0usize;

        while let Some(field) = payload.next().await {
            let mut field = field?;
            let disposition = field.content_disposition();
            let name = disposition.get_name().unwrap_or_default().to_string();
            let is_file = disposition.get_filename().is_some();
            let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

            let mut data = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk?;
                if data.len() + chunk.len() > max_bytes {
                    return Err(ApiError(AppError::PayloadTooLarge(format!(
                        "field '{name}' exceeds {max_bytes} bytes"
                    ))));
                }
                total += chunk.len();
                if total > max_total {
                    return Err(ApiError(AppError::PayloadTooLarge(format!(
                        "form exceeds {max_total} bytes"
                    ))));
                }
                data.extend_from_slice(&chunk);
            }

            if is_file {
                // Browsers send an empty part for an untouched file input.
                if name != IMAGE_FIELD || data.is_empty() {
                    continue;
                }
                let content_type = content_type.unwrap_or_else(|| "application/octet-stream".into());
                if !content_type.starts_with("image/") {
                    return Err(invalid(format!("expected an image upload, got {content_type}")));
                }
                form.image = Some(ImageUpload { data, content_type });
            } else {
                let value = String::from_utf8(data)
                    .map_err(|_| invalid(format!("field '{name}' is not valid UTF-8")))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_text(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    /// A timestamp field; absent or blank reads as `None`.
    pub fn datetime(&self, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
        match self.text(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_datetime(raw)
                .map(Some)
                .map_err(|_| invalid(format!("'{name}' is not a valid date: {raw}"))),
        }
    }

    /// A checkbox-style field: `true`/`on`/`1` or `false`/`off`/`0`.
    pub fn flag(&self, name: &str) -> Result<Option<bool>, ApiError> {
        match self.text(name).map(str::trim) {
            None => Ok(None),
            Some("true" | "on" | "1") => Ok(Some(true)),
            Some("false" | "off" | "0" | "") => Ok(Some(false)),
            Some(other) => Err(invalid(format!("'{name}' must be true or false, got {other}"))),
        }
    }
}

/// Accepts RFC 3339, a `datetime-local` value (read as UTC) or a bare date
/// (midnight UTC).
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Ok(at.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|day| day.and_time(chrono::NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2025-01-10").unwrap(), expected);
        assert_eq!(parse_datetime("2025-01-10T00:00").unwrap(), expected);
        assert_eq!(parse_datetime("2025-01-10T02:00:00+02:00").unwrap(), expected);
        assert!(parse_datetime("10/01/2025").is_err());
    }

    #[test]
    fn test_blank_fields() {
        let mut form = FormData::default();
        form.fields.insert("starts_at".into(), "  ".into());
        form.fields.insert("published".into(), "on".into());
        form.fields.insert("broken".into(), "tomorrow".into());

        assert_eq!(form.datetime("starts_at").unwrap(), None);
        assert_eq!(form.datetime("missing").unwrap(), None);
        assert!(form.datetime("broken").is_err());
        assert_eq!(form.flag("published").unwrap(), Some(true));
        assert_eq!(form.flag("missing").unwrap(), None);
    }
}
