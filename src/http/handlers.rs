//! Axum handler that walks the resource tree for every request
//!
//! The request path is split into segments, each percent-decoded and resolved against the
//! node before it, and the final node renders the response for the HTTP method.

use std::borrow::Cow;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;

use crate::errors::AppError;
use crate::resource::Resource;
use crate::AppState;

const CORS_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (
        header::ACCESS_CONTROL_ALLOW_METHODS,
        "GET, POST, PATCH, PUT, DELETE",
    ),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "X-Requested-With"),
];

pub async fn resource_endpoint(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let _serialized = state.dispatch_lock.lock().await;

    let rendered = path_segments(uri.path())
        .and_then(|segments| {
            Resource::Root(state.root.clone()).walk(segments.iter().map(|segment| &**segment))
        })
        .and_then(|node| match method {
            Method::GET | Method::HEAD => node.render_get(),
            Method::POST => node.render_post(&body, &state.decoder),
            other => Err(AppError::method_not_allowed(other.as_str())),
        });

    match rendered {
        Ok(body) => json_response(body),
        Err(err) => err.into_response(),
    }
}

/// Decoded segments after the leading slash; `/` yields a single empty segment.
///
/// The raw path is split before decoding, so `%2F` stays inside its segment. A segment that
/// does not decode to UTF-8 names no child.
pub fn path_segments(path: &str) -> Result<Vec<Cow<'_, str>>, AppError> {
    path.strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| AppError::child_not_found(segment))
        })
        .collect()
}

fn json_response(mut body: Vec<u8>) -> Response {
    body.push(b'\n');
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}
