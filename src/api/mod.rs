pub mod middleware;
pub mod ws;

use crate::error::VfsError;
use crate::service::fields;
use crate::service::{VfsMethod, VfsPayload, VfsReply};
use crate::storage::FileStream;
use crate::utils::session::Session;
use crate::utils::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let vfs = Router::new()
        .route("/{method}", get(get_handler).post(post_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    Router::new()
        .nest("/vfs", vfs)
        .route("/auth/login", post(crate::service::auth::login))
        .route("/ws", get(ws::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /vfs/<method>
///
/// Read operations carry their fields in the query string; `readfile`
/// additionally honors a `Range` header.
async fn get_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(method): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, VfsError> {
    let Some(method) = VfsMethod::from_name(&method) else {
        return Ok((StatusCode::NOT_FOUND, "not found").into_response());
    };

    match method {
        VfsMethod::Exists | VfsMethod::Stat | VfsMethod::Readdir => {
            let payload = VfsPayload {
                fields: fields::parse_query(&query)?,
                upload: None,
                range: None,
            };
            json_response(state.filesystem.dispatch(&session, method, payload).await?)
        }
        VfsMethod::Readfile => {
            let range = headers
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(fields::parse_range_header);
            let payload = VfsPayload {
                fields: fields::parse_query(&query)?,
                upload: None,
                range,
            };
            match state
                .filesystem
                .dispatch(&session, VfsMethod::Readfile, payload)
                .await?
            {
                VfsReply::Stream {
                    stream,
                    filename,
                    download,
                } => Ok(stream_response(stream, &filename, download)),
                VfsReply::Json(value) => Ok(Json(value).into_response()),
            }
        }
        // `realpath` stays internal; write operations go through POST
        _ => Ok((StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response()),
    }
}

/// POST /vfs/<method>
///
/// Write operations carry a JSON body, or `multipart/form-data` for
/// `writefile` (file bytes under the `upload` field).
async fn post_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(method): Path<String>,
    request: Request,
) -> Result<Response, VfsError> {
    let Some(method) = VfsMethod::from_name(&method) else {
        return Ok((StatusCode::NOT_FOUND, "not found").into_response());
    };

    match method {
        VfsMethod::Writefile
        | VfsMethod::Mkdir
        | VfsMethod::Rename
        | VfsMethod::Copy
        | VfsMethod::Unlink
        | VfsMethod::Search
        | VfsMethod::Touch => {
            let payload = fields::parse_body(request).await?;
            json_response(state.filesystem.dispatch(&session, method, payload).await?)
        }
        _ => Ok((StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response()),
    }
}

fn json_response(reply: VfsReply) -> Result<Response, VfsError> {
    match reply {
        VfsReply::Json(value) => Ok(Json(value).into_response()),
        VfsReply::Stream { .. } => Err(VfsError::Validation(
            "operation produced a stream where JSON was expected".to_string(),
        )),
    }
}

fn stream_response(stream: FileStream, filename: &str, download: bool) -> Response {
    let FileStream {
        reader,
        total,
        range,
        mime,
    } = stream;

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(header::ACCEPT_RANGES, "bytes");

    let builder = match range {
        Some((start, end)) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
            .header(header::CONTENT_LENGTH, end - start + 1),
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, total),
    };

    let builder = if download {
        builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
    } else {
        builder
    };

    builder
        .body(Body::from_stream(ReaderStream::new(reader)))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ranged_stream() -> FileStream {
        FileStream {
            reader: Box::new(Cursor::new(b"2345".to_vec())),
            total: 10,
            range: Some((2, 5)),
            mime: "application/octet-stream".to_string(),
        }
    }

    #[test]
    fn test_ranged_read_is_partial_content() {
        let response = stream_response(ranged_stream(), "data.bin", false);

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert!(headers.get(header::CONTENT_DISPOSITION).is_none());
    }

    #[test]
    fn test_full_read_is_ok_with_total_length() {
        let stream = FileStream {
            reader: Box::new(Cursor::new(b"0123456789".to_vec())),
            total: 10,
            range: None,
            mime: "text/plain".to_string(),
        };
        let response = stream_response(stream, "notes.txt", false);

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_LENGTH], "10");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert!(headers.get(header::CONTENT_RANGE).is_none());
    }

    #[test]
    fn test_download_sets_attachment_disposition() {
        let response = stream_response(ranged_stream(), "data.bin", true);

        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"data.bin\""
        );
    }
}
