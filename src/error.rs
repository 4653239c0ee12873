use thiserror::Error;

use crate::SendableError;

/// Errors surfaced by the middleware chain, the interceptors and the multipart decoder.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown interceptor name or malformed chain setup. Raised before any request runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request body does not follow the multipart boundary/header grammar.
    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] http::Error),

    #[error("handler error: {0}")]
    Handler(#[from] SendableError),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedMultipart(reason.into())
    }

    pub fn is_malformed_multipart(&self) -> bool {
        matches!(self, Error::MalformedMultipart(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
