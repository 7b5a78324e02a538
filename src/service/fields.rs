//! Request payload parsing.
//!
//! GET requests carry their fields in the query string; POST requests
//! carry `multipart/form-data` (the file under the `upload` field,
//! spooled to a temp file) or a JSON body. The `options` field may be a
//! JSON object or a JSON-encoded string.

use crate::error::VfsError;
use crate::service::{Fields, Upload, VfsOptions, VfsPayload};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::HashMap;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// Upper bound for buffered JSON bodies. Request fields are a handful of
/// short strings; file bytes arrive as multipart and are never buffered.
const MAX_JSON_BODY: usize = 256 * 1024;

fn parse_options(raw: Option<&Value>) -> Result<VfsOptions, VfsError> {
    let Some(value) = raw else {
        return Ok(VfsOptions::default());
    };

    let value = match value {
        Value::String(encoded) => serde_json::from_str::<Value>(encoded)
            .map_err(|e| VfsError::Validation(format!("invalid options payload: {e}")))?,
        other => other.clone(),
    };

    serde_json::from_value(value)
        .map_err(|e| VfsError::Validation(format!("invalid options payload: {e}")))
}

fn string_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn fields_from_map(map: &HashMap<String, Value>) -> Result<Fields, VfsError> {
    Ok(Fields {
        path: map.get("path").and_then(string_field),
        from: map.get("from").and_then(string_field),
        to: map.get("to").and_then(string_field),
        root: map.get("root").and_then(string_field),
        pattern: map.get("pattern").and_then(string_field),
        options: parse_options(map.get("options"))?,
    })
}

/// Parses GET query parameters into fields.
pub fn parse_query(query: &HashMap<String, String>) -> Result<Fields, VfsError> {
    let map: HashMap<String, Value> = query
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    fields_from_map(&map)
}

/// Parses a POST body, multipart or JSON, into a payload. Multipart
/// uploads are written to a temp file that lives as long as the payload.
pub async fn parse_body(request: Request) -> Result<VfsPayload, VfsError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| VfsError::Validation(e.to_string()))?;
        parse_multipart(multipart).await
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), MAX_JSON_BODY)
            .await
            .map_err(|e| VfsError::Validation(e.to_string()))?;
        let map: HashMap<String, Value> = if bytes.is_empty() {
            HashMap::new()
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| VfsError::Validation(format!("invalid JSON body: {e}")))?
        };

        Ok(VfsPayload {
            fields: fields_from_map(&map)?,
            upload: None,
            range: None,
        })
    }
}

async fn parse_multipart(mut multipart: Multipart) -> Result<VfsPayload, VfsError> {
    let mut map = HashMap::new();
    let mut upload = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| VfsError::Validation(e.to_string()))?
    {
        let Some(name) = field.name().map(String::from) else {
            continue;
        };

        if name == "upload" {
            let spool =
                NamedTempFile::new().map_err(|e| VfsError::Validation(e.to_string()))?;
            let mut writer = tokio::fs::File::create(spool.path())
                .await
                .map_err(VfsError::Adapter)?;
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| VfsError::Validation(e.to_string()))?
            {
                writer.write_all(&chunk).await.map_err(VfsError::Adapter)?;
            }
            writer.flush().await.map_err(VfsError::Adapter)?;
            upload = Some(Upload { file: spool });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| VfsError::Validation(e.to_string()))?;
            map.insert(name, Value::String(text));
        }
    }

    Ok(VfsPayload {
        fields: fields_from_map(&map)?,
        upload,
        range: None,
    })
}

/// Parses an HTTP `Range: bytes=<start>-<end>` header; the end bound is
/// optional.
pub fn parse_range_header(value: &str) -> Option<crate::storage::ReadRange> {
    let raw = value.trim().strip_prefix("bytes=")?;
    let (start, end) = raw.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => None,
        text => Some(text.parse::<u64>().ok()?),
    };
    Some(crate::storage::ReadRange { start, end })
}
