use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

/// everything the proxy pipeline can fail with
/// each variant carries enough context for the client to diagnose the failure
/// without digging through server logs
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // the /proxy/ path suffix didn't decode to an http(s) url
    #[error("Invalid proxy target: {0:?}")]
    InvalidTarget(String),

    // upstream answered with a non-2xx status, snippet is a truncated body preview
    #[error("Upstream returned HTTP {status} for {url}: {snippet}")]
    UpstreamStatus {
        status: u16,
        url: String,
        snippet: String,
    },

    // dns, timeout, connection reset - anything below the http layer
    #[error("Failed to reach upstream {url}: {message}")]
    UpstreamTransport { url: String, message: String },

    // nested master playlists went past the configured depth
    #[error("Too many recursion levels ({limit}) while resolving master playlist: {url}")]
    RecursionLimitExceeded { url: String, limit: u32 },

    #[error("Internal server error: {0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::UpstreamTransport { .. }
            | Error::RecursionLimitExceeded { .. }
            | Error::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // the target url this failure was about, when there is one to report
    fn target_url(&self) -> Option<&str> {
        match self {
            Error::InvalidTarget(_) => None,
            Error::UpstreamStatus { url, .. }
            | Error::UpstreamTransport { url, .. }
            | Error::RecursionLimitExceeded { url, .. } => Some(url),
            Error::InternalServerErrorWithContext(_) => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("proxy request failed: {}", self);

        // CORS headers land on this response through the router's CorsLayer,
        // the body just carries the structured diagnostic
        let body = json!({
            "success": false,
            "error": self.to_string(),
            "targetUrl": self.target_url(),
        });

        (self.status_code(), Json(body)).into_response()
    }
}
