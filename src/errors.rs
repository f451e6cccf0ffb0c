use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::codec::EncodingError;

pub const NO_SUCH_CHILD: &str = "No such child resource.";

/// Transport-level failures of a single HTTP exchange.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no such child resource: {name}")]
    ChildNotFound { name: String },
    #[error("method not allowed: {method}")]
    MethodNotAllowed { method: String },
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn child_not_found(name: impl Into<String>) -> Self {
        Self::ChildNotFound { name: name.into() }
    }

    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::ChildNotFound { .. } => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                NO_SUCH_CHILD,
            )
                .into_response(),
            Self::MethodNotAllowed { method } => (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "GET, HEAD, POST")],
                Json(ErrorResponse {
                    code: "method_not_allowed".to_string(),
                    message: format!("{method} is not supported by this resource"),
                    details: json!({}),
                }),
            )
                .into_response(),
            Self::Encoding(err) => {
                tracing::error!(error = %err, "failed to encode resource");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        code: "encoding_error".to_string(),
                        message: err.to_string(),
                        details: json!({}),
                    }),
                )
                    .into_response()
            }
        }
    }
}
