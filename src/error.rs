use axum::{
    Json,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Problems with what the caller sent. Always answered with 400.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("HTML content is required")]
    MissingHtml,

    #[error("HTML content at index {index} is empty")]
    EmptyHtmlAt { index: usize },

    #[error("HTML content exceeds maximum size of {limit} bytes")]
    HtmlTooLarge { limit: usize },

    #[error("HTML content at index {index} exceeds maximum size of {limit} bytes")]
    HtmlTooLargeAt { index: usize, limit: usize },

    #[error("HTML list cannot be empty")]
    EmptyBatch,

    #[error("Batch size exceeds maximum of {limit} items")]
    BatchTooLarge { limit: usize },

    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("HTML body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Unsupported content type: {0} (expected application/json or text/html)")]
    UnsupportedContentType(String),

    #[error("Unknown paper format: {0}")]
    UnknownFormat(String),

    #[error("Invalid {side} margin: {value}")]
    InvalidMargin { side: &'static str, value: String },

    #[error("Scale must be between 0.1 and 2.0, got {0}")]
    ScaleOutOfRange(f64),
}

pub enum HttpError {
    BadRequest(anyhow::Error),
    InternalServerError(anyhow::Error),
    /// The body could not be read, e.g. it exceeded the body limit (413).
    Rejected(BytesRejection),
}

impl HttpError {
    pub fn bad_request(err: impl Into<anyhow::Error>) -> Self {
        Self::BadRequest(err.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::BadRequest(err) => {
                tracing::debug!("Bad Request: {}", err);

                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorBody {
                        detail: err.to_string(),
                    }),
                )
                    .into_response()
            }
            HttpError::Rejected(rejection) => {
                tracing::debug!("Rejected request body: {}", rejection.body_text());

                (
                    rejection.status(),
                    Json(ErrorBody {
                        detail: rejection.body_text(),
                    }),
                )
                    .into_response()
            }
            HttpError::InternalServerError(err) => {
                tracing::error!("Internal Server Error: {:#}", err);

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        detail: format!("Failed to convert HTML to PDF: {:#}", err),
                    }),
                )
                    .into_response()
            }
        }
    }
}

// Lets handlers use `?` on anything anyhow accepts; those failures are
// reported as 500. Caller mistakes go through `HttpError::bad_request`.
impl<E> From<E> for HttpError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}
